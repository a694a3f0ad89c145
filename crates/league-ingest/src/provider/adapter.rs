//! Data-driven provider adapters.
//!
//! An adapter is a table row, not code: it says how a provider authenticates
//! and, for each data type it serves, which endpoint to call, where parameters
//! go and where the records live inside the response.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::catalog;
use super::transport::ProviderRequest;
use crate::config::{Credentials, ProviderConfig};
use crate::errors::IngestError;
use crate::models::{DataType, HttpMethod, IngestRequest, RequestDescriptor};

/// Header carrying the caller's idempotency key on mutating requests.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// How credentials are attached to a request.
///
/// Each variant names the credential entries it reads from
/// [`ProviderConfig::credentials`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    /// `Authorization: Bearer <credential>`.
    Bearer { credential: &'static str },
    /// `?<param>=<credential>`.
    QueryKey {
        param: &'static str,
        credential: &'static str,
    },
    /// `<name>: <credential>`.
    Header {
        name: &'static str,
        credential: &'static str,
    },
    /// `Cookie: <cookie>=<credential>; ...` as `(cookie, credential)` pairs.
    Cookies {
        names: &'static [(&'static str, &'static str)],
    },
}

impl AuthScheme {
    /// Credential entries this scheme requires.
    pub fn required_credentials(&self) -> Vec<&'static str> {
        match self {
            Self::None => Vec::new(),
            Self::Bearer { credential }
            | Self::QueryKey { credential, .. }
            | Self::Header { credential, .. } => vec![*credential],
            Self::Cookies { names } => names.iter().map(|(_, credential)| *credential).collect(),
        }
    }

    fn apply(
        &self,
        provider: &str,
        credentials: &Credentials,
        request: &mut ProviderRequest,
    ) -> Result<(), IngestError> {
        let lookup = |name: &str| {
            credentials.get(name).ok_or_else(|| {
                IngestError::configuration(format!(
                    "provider '{}' is missing credential '{}'",
                    provider, name
                ))
            })
        };

        match self {
            Self::None => {}
            Self::Bearer { credential } => {
                let token = lookup(credential)?;
                request
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
            Self::QueryKey { param, credential } => {
                let key = lookup(credential)?;
                request.query.push((param.to_string(), key.to_string()));
            }
            Self::Header { name, credential } => {
                let value = lookup(credential)?;
                request.headers.push((name.to_string(), value.to_string()));
            }
            Self::Cookies { names } => {
                let cookie = names
                    .iter()
                    .map(|(cookie, credential)| {
                        lookup(credential).map(|value| format!("{}={}", cookie, value))
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join("; ");
                request.headers.push(("Cookie".to_string(), cookie));
            }
        }
        Ok(())
    }
}

/// Where parameters not consumed by the path template are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamPlacement {
    Query,
    Header,
    /// As a JSON object body. Not allowed on `GET` endpoints.
    Body,
}

/// One endpoint of a provider.
#[derive(Clone, Copy, Debug)]
pub struct EndpointSpec {
    pub data_type: DataType,
    pub method: HttpMethod,
    /// Path appended to the base address. `{league_id}` and `{param}`
    /// placeholders are filled in and percent-encoded.
    pub path: &'static str,
    /// Query parameter carrying the league id, for providers that don't put it
    /// in the path.
    pub league_param: Option<&'static str>,
    pub fixed_query: &'static [(&'static str, &'static str)],
    pub placement: ParamPlacement,
    /// JSON pointer to the records inside the response; `None` for the root.
    pub records_at: Option<&'static str>,
}

impl EndpointSpec {
    /// Pull the records out of a raw response document.
    ///
    /// `Ok(None)` means the pointer indexes into a list the provider returned
    /// empty: there is no record yet, which is not a contract violation.
    pub fn extract(&self, raw: Value) -> Result<Option<Value>, IngestError> {
        let Some(pointer) = self.records_at else {
            return Ok(Some(raw));
        };
        if let Some(value) = raw.pointer(pointer) {
            return Ok(Some(value.clone()));
        }

        let parent = pointer.rsplit_once('/').map_or("", |(parent, _)| parent);
        match raw.pointer(parent) {
            Some(Value::Array(items)) if items.is_empty() => Ok(None),
            _ => Err(IngestError::Validation {
                data_type: self.data_type,
                message: format!("response has no value at '{}'", pointer),
            }),
        }
    }
}

/// Request-building rules for one provider.
#[derive(Clone, Debug)]
pub struct ProviderAdapter {
    pub id: &'static str,
    pub auth: AuthScheme,
    pub default_headers: &'static [(&'static str, &'static str)],
    pub endpoints: &'static [EndpointSpec],
}

impl ProviderAdapter {
    pub fn endpoint(&self, data_type: DataType) -> Option<&EndpointSpec> {
        self.endpoints.iter().find(|e| e.data_type == data_type)
    }

    /// Data types this provider serves, in endpoint order.
    pub fn supported(&self) -> Vec<DataType> {
        self.endpoints.iter().map(|e| e.data_type).collect()
    }

    pub fn supports(&self, data_type: DataType) -> bool {
        self.endpoint(data_type).is_some()
    }
}

/// A request ready to hand to a transport, plus what's needed to read the reply.
#[derive(Clone, Debug)]
pub struct PreparedCall {
    pub descriptor: RequestDescriptor,
    pub request: ProviderRequest,
    pub endpoint: EndpointSpec,
}

/// Provider id to adapter.
#[derive(Clone)]
pub struct AdapterTable {
    adapters: HashMap<String, Arc<ProviderAdapter>>,
}

impl AdapterTable {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            adapters: catalog::BUILTIN_ADAPTERS.clone(),
        }
    }

    /// Add or replace an adapter.
    pub fn register(&mut self, adapter: ProviderAdapter) {
        self.adapters
            .insert(adapter.id.to_string(), Arc::new(adapter));
    }

    pub fn with(mut self, adapter: ProviderAdapter) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider_id: &str) -> Result<&ProviderAdapter, IngestError> {
        self.adapters
            .get(provider_id)
            .map(Arc::as_ref)
            .ok_or_else(|| {
                IngestError::configuration(format!(
                    "no adapter registered for provider '{}'",
                    provider_id
                ))
            })
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Canonical descriptor for `request`.
    pub fn describe(&self, request: &IngestRequest) -> Result<RequestDescriptor, IngestError> {
        let adapter = self.get(&request.provider_id)?;
        let endpoint = endpoint_for(adapter, request.data_type)?;
        Ok(descriptor(endpoint, request))
    }

    /// Build the concrete request for `request` against `config`.
    pub fn build_request(
        &self,
        config: &ProviderConfig,
        request: &IngestRequest,
    ) -> Result<ProviderRequest, IngestError> {
        self.prepare(config, request).map(|call| call.request)
    }

    /// Describe and build in one go.
    pub fn prepare(
        &self,
        config: &ProviderConfig,
        request: &IngestRequest,
    ) -> Result<PreparedCall, IngestError> {
        let adapter = self.get(&request.provider_id)?;
        let endpoint = endpoint_for(adapter, request.data_type)?;
        let mut descriptor = descriptor(endpoint, request);

        let (path, mut remaining) = fill_path(endpoint, request)?;
        let mut provider_request = ProviderRequest {
            method: endpoint.method,
            url: format!("{}{}", config.base_address.trim_end_matches('/'), path),
            query: Vec::new(),
            headers: adapter
                .default_headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: None,
            timeout: config.timeout(),
        };

        if let Some(param) = endpoint.league_param {
            provider_request
                .query
                .push((param.to_string(), request.league_id.clone()));
        }
        provider_request.query.extend(
            endpoint
                .fixed_query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        match endpoint.placement {
            ParamPlacement::Query => provider_request.query.extend(remaining),
            ParamPlacement::Header => provider_request.headers.extend(remaining),
            ParamPlacement::Body => {
                if endpoint.method.is_read() {
                    return Err(IngestError::InvalidRequest {
                        message: format!(
                            "{} {} places parameters in the body of a {} request",
                            adapter.id, endpoint.data_type, endpoint.method
                        ),
                    });
                }
                let body: Map<String, Value> = std::mem::take(&mut remaining)
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                let body = Value::Object(body);
                descriptor.body = Some(body.clone());
                provider_request.body = Some(body);
            }
        }

        if let Some(key) = &descriptor.idempotency_key {
            provider_request
                .headers
                .push((IDEMPOTENCY_HEADER.to_string(), key.clone()));
        }

        adapter
            .auth
            .apply(adapter.id, &config.credentials, &mut provider_request)?;

        Ok(PreparedCall {
            descriptor,
            request: provider_request,
            endpoint: *endpoint,
        })
    }
}

impl Default for AdapterTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn endpoint_for(
    adapter: &ProviderAdapter,
    data_type: DataType,
) -> Result<&EndpointSpec, IngestError> {
    adapter
        .endpoint(data_type)
        .ok_or_else(|| IngestError::UnsupportedDataType {
            provider: adapter.id.to_string(),
            data_type,
        })
}

fn descriptor(endpoint: &EndpointSpec, request: &IngestRequest) -> RequestDescriptor {
    RequestDescriptor {
        provider_id: request.provider_id.clone(),
        data_type: request.data_type,
        league_id: request.league_id.clone(),
        method: endpoint.method,
        path_template: endpoint.path.to_string(),
        params: request.params.clone(),
        body: None,
        // Reads are repeatable by definition; the key only travels with writes.
        idempotency_key: request
            .idempotency_key
            .clone()
            .filter(|_| !endpoint.method.is_read()),
    }
}

/// Substitute path placeholders; returns the path and the unconsumed params
/// sorted by name.
fn fill_path(
    endpoint: &EndpointSpec,
    request: &IngestRequest,
) -> Result<(String, Vec<(String, String)>), IngestError> {
    let mut remaining: BTreeMap<String, String> = request
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut path = String::with_capacity(endpoint.path.len());
    let mut rest = endpoint.path;
    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| IngestError::InvalidRequest {
            message: format!("unterminated placeholder in path '{}'", endpoint.path),
        })?;
        let name = &after[..close];

        let value = if name == "league_id" {
            request.league_id.clone()
        } else {
            remaining.remove(name).ok_or_else(|| IngestError::InvalidRequest {
                message: format!(
                    "missing path parameter '{}' for {} {}",
                    name, request.provider_id, request.data_type
                ),
            })?
        };
        if value.is_empty() {
            return Err(IngestError::InvalidRequest {
                message: format!("path parameter '{}' must not be empty", name),
            });
        }
        path.push_str(&urlencoding::encode(&value));
        rest = &after[close + 1..];
    }
    path.push_str(rest);

    Ok((path, remaining.into_iter().collect()))
}
