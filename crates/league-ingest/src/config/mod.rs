//! Provider configuration.
//!
//! Configuration is loaded by the host and handed over already parsed; this module
//! only defines the shapes and validates them. Any problem surfaces as
//! [`IngestError::Configuration`] before a single call is attempted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::errors::IngestError;
use crate::registry::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy, ValidatorConfig};

/// Default number of cached responses kept in memory.
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Opaque credential material for a provider.
///
/// The core never interprets these values; the provider adapter's auth scheme
/// names which entries it injects. `Debug` output redacts the values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Configuration for one provider. Immutable after load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub base_address: String,
    #[serde(default)]
    pub credentials: Credentials,
    pub max_concurrent: usize,
    #[serde(default)]
    pub min_spacing_ms: u64,
    pub timeout_ms: u64,
    #[serde(default)]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub retry_ceiling: u32,
    pub backoff_base_ms: u64,
}

impl ProviderConfig {
    /// A config with conservative defaults for everything but identity.
    pub fn new(id: impl Into<String>, base_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_address: base_address.into(),
            credentials: Credentials::new(),
            max_concurrent: 4,
            min_spacing_ms: 0,
            timeout_ms: 10_000,
            cache_ttl_seconds: 300,
            retry_ceiling: 3,
            backoff_base_ms: 500,
        }
    }

    /// Check every field; called on load and again before any bulk call.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.id.trim().is_empty() {
            return Err(IngestError::configuration("provider id must not be empty"));
        }

        let url = Url::parse(&self.base_address).map_err(|e| {
            IngestError::configuration(format!(
                "provider '{}' has an invalid base address: {}",
                self.id, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::configuration(format!(
                "provider '{}' base address must be http or https, got '{}'",
                self.id,
                url.scheme()
            )));
        }

        if self.max_concurrent == 0 {
            return Err(IngestError::configuration(format!(
                "provider '{}' maxConcurrent must be greater than zero",
                self.id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(IngestError::configuration(format!(
                "provider '{}' timeoutMs must be greater than zero",
                self.id
            )));
        }
        if self.backoff_base_ms == 0 {
            return Err(IngestError::configuration(format!(
                "provider '{}' backoffBaseMs must be greater than zero",
                self.id
            )));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    /// Zero means responses from this provider are not cached.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_concurrent: self.max_concurrent,
            min_spacing: self.min_spacing(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            ceiling: self.retry_ceiling,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

/// Validated provider configs indexed by id.
#[derive(Clone, Debug, Default)]
pub struct ProviderDirectory {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderDirectory {
    /// Build a directory, validating each config and rejecting duplicate ids.
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, IngestError> {
        let mut providers = HashMap::with_capacity(configs.len());
        for config in configs {
            config.validate()?;
            if providers.contains_key(&config.id) {
                return Err(IngestError::configuration(format!(
                    "duplicate provider id '{}'",
                    config.id
                )));
            }
            providers.insert(config.id.clone(), config);
        }
        Ok(Self { providers })
    }

    /// Parse a JSON array of provider configs.
    ///
    /// Expected format:
    /// ```json
    /// [
    ///   { "id": "sleeper", "baseAddress": "https://api.sleeper.app/v1",
    ///     "maxConcurrent": 4, "minSpacingMs": 250, "timeoutMs": 10000,
    ///     "cacheTtlSeconds": 300, "retryCeiling": 3, "backoffBaseMs": 500 }
    /// ]
    /// ```
    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        let configs: Vec<ProviderConfig> = serde_json::from_str(json)
            .map_err(|e| IngestError::configuration(format!("malformed provider config: {}", e)))?;
        Self::new(configs)
    }

    /// Look up a provider, failing with a configuration error if unknown.
    pub fn get(&self, provider_id: &str) -> Result<&ProviderConfig, IngestError> {
        self.providers
            .get(provider_id)
            .ok_or_else(|| IngestError::configuration(format!("unknown provider '{}'", provider_id)))
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Process-wide knobs for the shared components.
#[derive(Clone, Debug)]
pub struct IngestSettings {
    /// Maximum number of cached responses.
    pub cache_capacity: u64,
    pub circuit_breaker: CircuitBreakerConfig,
    pub validator: ValidatorConfig,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            circuit_breaker: CircuitBreakerConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProviderConfig::new("sleeper", "https://api.sleeper.app/v1");
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_policy().ceiling, 3);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = ProviderConfig::new("sleeper", "https://api.sleeper.app/v1");
        config.max_concurrent = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("maxConcurrent"));
    }

    #[test]
    fn test_rejects_bad_base_address() {
        let config = ProviderConfig::new("espn", "not a url");
        assert!(matches!(
            config.validate(),
            Err(IngestError::Configuration { .. })
        ));

        let config = ProviderConfig::new("espn", "ftp://fantasy.espn.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_and_backoff() {
        let mut config = ProviderConfig::new("espn", "https://fantasy.espn.com");
        config.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ProviderConfig::new("espn", "https://fantasy.espn.com");
        config.backoff_base_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_directory_from_json() {
        let json = r#"[
            {
                "id": "sleeper",
                "baseAddress": "https://api.sleeper.app/v1",
                "maxConcurrent": 4,
                "minSpacingMs": 250,
                "timeoutMs": 10000,
                "cacheTtlSeconds": 300,
                "retryCeiling": 3,
                "backoffBaseMs": 500
            },
            {
                "id": "espn",
                "baseAddress": "https://lm-api-reads.fantasy.espn.com/apis/v3/games/ffl",
                "credentials": { "espn_s2": "s2-cookie", "swid": "{ABC}" },
                "maxConcurrent": 2,
                "timeoutMs": 15000,
                "backoffBaseMs": 1000
            }
        ]"#;

        let directory = ProviderDirectory::from_json(json).unwrap();
        assert_eq!(directory.len(), 2);

        let espn = directory.get("espn").unwrap();
        assert_eq!(espn.credentials.get("espn_s2"), Some("s2-cookie"));
        assert_eq!(espn.retry_ceiling, 0);
        assert_eq!(espn.min_spacing(), Duration::ZERO);
    }

    #[test]
    fn test_directory_rejects_negative_and_malformed() {
        let json = r#"[{ "id": "x", "baseAddress": "https://x.test", "maxConcurrent": -1,
                        "timeoutMs": 1, "backoffBaseMs": 1 }]"#;
        assert!(matches!(
            ProviderDirectory::from_json(json),
            Err(IngestError::Configuration { .. })
        ));
        assert!(ProviderDirectory::from_json("{").is_err());
    }

    #[test]
    fn test_directory_rejects_duplicates() {
        let configs = vec![
            ProviderConfig::new("sleeper", "https://api.sleeper.app/v1"),
            ProviderConfig::new("sleeper", "https://api.sleeper.app/v2"),
        ];
        let err = ProviderDirectory::new(configs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unknown_provider_lookup() {
        let directory = ProviderDirectory::default();
        assert!(matches!(
            directory.get("yahoo"),
            Err(IngestError::Configuration { .. })
        ));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new().with("access_token", "super-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("access_token"));
        assert!(!debug.contains("super-secret"));
    }
}
