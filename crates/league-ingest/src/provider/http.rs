//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::{debug, warn};

use super::transport::{ProviderRequest, Transport, TransportResponse};
use crate::errors::IngestError;
use crate::models::HttpMethod;

const USER_AGENT: &str = concat!("league-ingest/", env!("CARGO_PKG_VERSION"));

/// Pool idle connections this long before closing them.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP transport sharing one pooled client across every provider.
///
/// The per-request timeout comes from the provider config carried on the
/// [`ProviderRequest`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        provider: &str,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, IngestError> {
        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("{} {} {}", provider, request.method, request.url);

        let network_error = |e: reqwest::Error| {
            if e.is_timeout() {
                IngestError::Timeout {
                    provider: provider.to_string(),
                    timeout: request.timeout,
                }
            } else {
                IngestError::Network {
                    provider: provider.to_string(),
                    message: e.without_url().to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(&network_error)?;
        let status = response.status().as_u16();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.map_err(&network_error)?;

        if !(200..300).contains(&status) {
            warn!("{} responded HTTP {} for {}", provider, status, request.url);
        }

        Ok(TransportResponse {
            status,
            body,
            retry_after,
        })
    }
}
