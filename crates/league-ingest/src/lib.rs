//! League Ingest Crate
//!
//! Resilient ingestion of fantasy-league data from third-party providers.
//!
//! # Overview
//!
//! The crate fetches league data (standings, matchups, transactions, drafts,
//! analytics) from providers such as Sleeper, ESPN and Fleaflicker, and hands
//! back validated, normalized JSON. Every call goes through:
//! - A TTL response cache keyed by a canonical request descriptor
//! - A per-provider rate limiter
//! - Retries with exponential backoff for transient failures
//! - A per-provider circuit breaker
//! - Schema validation per data type
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  IngestRequest   |  (provider, data type, league, params)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |  AdapterTable    | --> | RequestDescriptor|  (cache key)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |    Ingestor      |  cache -> circuit -> rate limiter -> retries
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |    Transport     |  (HTTP, or anything else)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | SchemaValidator  |  -> IngestionResult / LeagueReport
//! +------------------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use league_ingest::{HttpTransport, Ingestor, LeagueTarget, ProviderConfig};
//!
//! # async fn run() -> Result<(), league_ingest::IngestError> {
//! let sleeper = ProviderConfig::new("sleeper", "https://api.sleeper.app/v1");
//! let ingestor = Ingestor::new(vec![sleeper], Arc::new(HttpTransport::new()))?;
//!
//! let target = LeagueTarget::new("sleeper", "784512")
//!     .with_param("week", "3")
//!     .with_param("round", "3");
//! let report = ingestor.ingest_league(&target).await?;
//! println!("{} ok, {} failed", report.succeeded().len(), report.failed().len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod provider;
pub mod registry;
pub mod store;

pub use config::{Credentials, IngestSettings, ProviderConfig, ProviderDirectory};
pub use errors::{ErrorKind, IngestError, RetryClass};

pub use models::{
    DataType, HttpMethod, IngestRequest, IngestionResult, LeagueId, LeagueReport,
    LeagueSnapshot, LeagueTarget, PayloadShape, ProviderId, RequestDescriptor,
};

pub use events::{IngestEvent, IngestEventSink, IngestMetrics, MetricsSnapshot, RequestKey};

pub use provider::{
    AdapterTable, AuthScheme, EndpointSpec, HttpTransport, ParamPlacement, ProviderAdapter,
    ProviderRequest, Transport, TransportResponse,
};

pub use registry::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FetchDiagnostics, Ingestor,
    RateLimitConfig, RateLimiter, ResponseCache, RetryController, RetryPolicy, SchemaValidator,
    ValidationSeverity, ValidatorConfig,
};

pub use store::{InMemorySnapshotStore, NoOpSnapshotStore, SnapshotStore, StoreError};
