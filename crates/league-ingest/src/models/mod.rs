//! Ingestion models
//!
//! This module contains the value types shared by every component:
//! - `types` - Type aliases for common identifiers (ProviderId, LeagueId)
//! - `data_type` - The data types a provider can serve and their payload shapes
//! - `descriptor` - Canonical request descriptors and cache keys
//! - `result` - Ingestion requests, per-item results and league reports
//! - `snapshot` - Validated payloads handed to persistence

mod data_type;
mod descriptor;
mod result;
mod snapshot;
mod types;

pub use data_type::{DataType, PayloadShape};
pub use descriptor::{canonical_json, HttpMethod, RequestDescriptor};
pub use result::{IngestRequest, IngestionResult, LeagueReport, LeagueTarget};
pub use snapshot::LeagueSnapshot;
pub use types::{LeagueId, ProviderId};
