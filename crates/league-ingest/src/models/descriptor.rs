//! Canonical request descriptors.
//!
//! A [`RequestDescriptor`] is the value-typed description of one logical request.
//! Its canonical form sorts parameter keys (and JSON object keys inside the body)
//! so that two descriptors differing only in insertion order produce the same
//! cache key.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::data_type::DataType;
use super::types::{LeagueId, ProviderId};

/// HTTP method of a provider endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Read-only methods are the only ones whose responses may be cached.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one logical request against a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub provider_id: ProviderId,
    pub data_type: DataType,
    pub league_id: LeagueId,
    pub method: HttpMethod,
    pub path_template: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Only meaningful for mutating requests.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl RequestDescriptor {
    /// Whether a response to this descriptor may be served from cache.
    pub fn is_cacheable(&self) -> bool {
        self.method.is_read()
    }

    /// Deterministic string form used for hashing.
    ///
    /// Covers provider, data type, league, method, sorted params and the canonical
    /// body. The path template and idempotency key are not part of it.
    pub fn canonical_string(&self) -> String {
        let mut params: Vec<(&String, &String)> = self.params.iter().collect();
        params.sort();

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let body = self
            .body
            .as_ref()
            .map(canonical_json)
            .unwrap_or_default();

        format!(
            "{}|{}|{}|{}|{}|{}",
            self.provider_id, self.data_type, self.league_id, self.method, query, body
        )
    }

    /// Stable cache/dedup key: hex MD5 of [`canonical_string`](Self::canonical_string).
    pub fn cache_key(&self) -> String {
        format!("{:x}", md5::compute(self.canonical_string().as_bytes()))
    }
}

/// Serialize a JSON value with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", fields)
        }
        Value::Array(items) => {
            let items = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", items)
        }
        other => other.to_string(),
    }
}
