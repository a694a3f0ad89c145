//! Transport boundary.
//!
//! The orchestrator never talks HTTP itself; it hands a fully built
//! [`ProviderRequest`] to a [`Transport`] and gets the raw status and body back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::IngestError;
use crate::models::HttpMethod;

/// A concrete request for one provider call.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ProviderRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After`, seconds form only.
    pub retry_after: Option<Duration>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes provider requests.
///
/// Implementations return `Err` only when no response was received
/// ([`IngestError::Network`] or [`IngestError::Timeout`]); any HTTP status,
/// including errors, comes back as a [`TransportResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        provider: &str,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, IngestError>;
}
