//! Provider adapters and transports.
//!
//! This module contains:
//! - The adapter table mapping provider ids to request-building rules
//! - The built-in catalog (Sleeper, ESPN, Fleaflicker)
//! - The `Transport` trait and its reqwest implementation
//!
//! Adding a provider means adding a table row: an auth scheme and one
//! endpoint per data type. No call site branches on the provider id.

mod adapter;
pub mod catalog;
mod http;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{
    AdapterTable, AuthScheme, EndpointSpec, ParamPlacement, PreparedCall, ProviderAdapter,
    IDEMPOTENCY_HEADER,
};
pub use http::HttpTransport;
pub use transport::{ProviderRequest, Transport, TransportResponse};
