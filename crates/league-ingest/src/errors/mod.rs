//! Error types and retry classification for the ingestion layer.
//!
//! This module provides:
//! - [`IngestError`]: The main error enum for all ingestion operations
//! - [`ErrorKind`]: The closed set of kinds surfaced to callers
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DataType;

/// Errors that can occur during provider ingestion.
///
/// Each variant is classified into a [`RetryClass`] via [`retry_class`](Self::retry_class)
/// and tagged with an [`ErrorKind`] via [`kind`](Self::kind). Messages carry a
/// human-readable summary only, never raw upstream bodies.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    /// Unknown provider, malformed provider config or missing credential.
    /// Raised before anything is queued.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No response was received from the provider.
    #[error("Network error: {provider} - {message}")]
    Network { provider: String, message: String },

    /// The call did not complete within the provider timeout.
    #[error("Timeout: {provider} after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// HTTP 5xx from the provider.
    #[error("Upstream server error: {provider} returned HTTP {status}")]
    UpstreamServer { provider: String, status: u16 },

    /// HTTP 429 from the provider.
    #[error("Rate limited: {provider}")]
    RateLimited {
        provider: String,
        /// Parsed `Retry-After`, if the provider sent one.
        retry_after: Option<Duration>,
    },

    /// Any other HTTP 4xx from the provider.
    #[error("Upstream client error: {provider} returned HTTP {status}")]
    UpstreamClient { provider: String, status: u16 },

    /// The response did not match the data type's contract.
    #[error("Validation failed for {data_type}: {message}")]
    Validation { data_type: DataType, message: String },

    /// The provider's adapter has no endpoint for this data type.
    #[error("Unsupported data type: {provider} does not serve {data_type}")]
    UnsupportedDataType { provider: String, data_type: DataType },

    /// The request could not be built (missing path parameter, body on a read).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The provider's circuit breaker is open.
    #[error("Circuit open: {provider}")]
    CircuitOpen { provider: String },

    /// A failure that fits no other kind (unexpected status, closed admission queue).
    #[error("Unclassified failure: {provider} - {message}")]
    Unclassified { provider: String, message: String },
}

/// Closed set of error kinds exposed in ingestion results.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Network,
    UpstreamServer,
    RateLimited,
    UpstreamClient,
    Validation,
    UnsupportedDataType,
    InvalidRequest,
    CircuitOpen,
    Unclassified,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::UpstreamServer => "upstream_server",
            Self::RateLimited => "rate_limited",
            Self::UpstreamClient => "upstream_client",
            Self::Validation => "validation",
            Self::UnsupportedDataType => "unsupported_data_type",
            Self::InvalidRequest => "invalid_request",
            Self::CircuitOpen => "circuit_open",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

impl IngestError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status from `provider`.
    ///
    /// 429 is rate limiting, 5xx is a server error, any other 4xx is a client
    /// error. Everything else (1xx, 3xx, nonsense codes) is unclassified.
    pub fn from_status(provider: &str, status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited {
                provider: provider.to_string(),
                retry_after,
            },
            500..=599 => Self::UpstreamServer {
                provider: provider.to_string(),
                status,
            },
            400..=499 => Self::UpstreamClient {
                provider: provider.to_string(),
                status,
            },
            _ => Self::Unclassified {
                provider: provider.to_string(),
                message: format!("unexpected HTTP status {}", status),
            },
        }
    }

    /// Returns the kind tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::Network,
            Self::UpstreamServer { .. } => ErrorKind::UpstreamServer,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::UpstreamClient { .. } => ErrorKind::UpstreamClient,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::UnsupportedDataType { .. } => ErrorKind::UnsupportedDataType,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use league_ingest::errors::{IngestError, RetryClass};
    ///
    /// let error = IngestError::from_status("sleeper", 503, None);
    /// assert_eq!(error.retry_class(), RetryClass::Retryable);
    ///
    /// let error = IngestError::from_status("sleeper", 404, None);
    /// assert_eq!(error.retry_class(), RetryClass::Fatal);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient - re-admit after backoff
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::UpstreamServer { .. }
            | Self::RateLimited { .. }
            | Self::Unclassified { .. } => RetryClass::Retryable,

            // Terminal - never retry
            Self::Configuration { .. }
            | Self::UpstreamClient { .. }
            | Self::Validation { .. }
            | Self::UnsupportedDataType { .. }
            | Self::InvalidRequest { .. }
            | Self::CircuitOpen { .. } => RetryClass::Fatal,
        }
    }

    /// `Retry-After` hint carried by a 429, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
