//! Ingestion orchestrator.
//!
//! The [`Ingestor`] wires every component together. A single fetch goes:
//!
//! 1. Pre-flight: provider config, adapter and credentials must exist
//! 2. Cache lookup (read endpoints only)
//! 3. Circuit breaker check
//! 4. Rate-limited transport call, wrapped in the provider timeout
//! 5. Retry loop driven by the [`RetryController`]
//! 6. Record extraction and schema validation
//! 7. Cache store, persistence, events
//!
//! Bulk ingestion runs fetches concurrently and records each outcome in a
//! [`LeagueReport`]. A provider that fails pre-flight only fails its own
//! leagues; every other league still runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};

use super::attempts::{AttemptOutcome, FetchDiagnostics};
use super::cache::ResponseCache;
use super::circuit_breaker::CircuitBreaker;
use super::rate_limiter::RateLimiter;
use super::retry::{QueueItem, RetryController, RetryDecision};
use super::validator::SchemaValidator;
use crate::config::{IngestSettings, ProviderConfig, ProviderDirectory};
use crate::errors::{IngestError, RetryClass};
use crate::events::{IngestEvent, IngestEventSink, NoOpEventSink, RequestKey};
use crate::models::{
    DataType, IngestRequest, IngestionResult, LeagueReport, LeagueSnapshot, LeagueTarget,
};
use crate::provider::{AdapterTable, PreparedCall, ProviderAdapter, Transport};
use crate::store::{NoOpSnapshotStore, SnapshotStore};

/// A validated payload and where it came from.
struct Fetched {
    data: Value,
    fetched_at: DateTime<Utc>,
    from_cache: bool,
}

/// Orchestrates cache, rate limiting, retries and validation across providers.
///
/// Each instance owns its own cache, limiter lanes and circuits; nothing is
/// shared process-wide.
pub struct Ingestor {
    providers: ProviderDirectory,
    adapters: AdapterTable,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SnapshotStore>,
    events: Arc<dyn IngestEventSink>,
    cache: ResponseCache,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    validator: SchemaValidator,
}

impl Ingestor {
    /// Create an ingestor for `configs` using the built-in adapters.
    ///
    /// Fails with [`IngestError::Configuration`] if any config is invalid.
    pub fn new(
        configs: Vec<ProviderConfig>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, IngestError> {
        let providers = ProviderDirectory::new(configs)?;
        let settings = IngestSettings::default();

        let rate_limiter = RateLimiter::new();
        for config in providers.iter() {
            rate_limiter.configure(&config.id, config.rate_limit());
        }

        Ok(Self {
            providers,
            adapters: AdapterTable::builtin(),
            transport,
            store: Arc::new(NoOpSnapshotStore),
            events: Arc::new(NoOpEventSink),
            cache: ResponseCache::new(settings.cache_capacity),
            rate_limiter,
            circuit_breaker: CircuitBreaker::new(settings.circuit_breaker),
            validator: SchemaValidator::new(settings.validator),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn IngestEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterTable) -> Self {
        self.adapters = adapters;
        self
    }

    /// Replace cache, circuit breaker and validator with ones built from `settings`.
    /// Cached entries and circuit state are discarded.
    pub fn with_settings(mut self, settings: IngestSettings) -> Self {
        self.cache = ResponseCache::new(settings.cache_capacity);
        self.circuit_breaker = CircuitBreaker::new(settings.circuit_breaker);
        self.validator = SchemaValidator::new(settings.validator);
        self
    }

    pub fn providers(&self) -> &ProviderDirectory {
        &self.providers
    }

    pub fn adapters(&self) -> &AdapterTable {
        &self.adapters
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Fetch, validate and return one data type for one league.
    ///
    /// Errors are terminal: retryable failures only surface once the retry
    /// ceiling is reached.
    pub async fn fetch_one(&self, request: &IngestRequest) -> Result<Value, IngestError> {
        let (result, diagnostics) = self.fetch_traced(request).await;
        debug!("{}", diagnostics.summary());
        result.map(|fetched| fetched.data)
    }

    /// Fetch every data type the provider serves for one league, concurrently.
    ///
    /// Per-data-type failures are recorded in the report; only a configuration
    /// problem with the provider is returned as an error.
    pub async fn ingest_league(&self, target: &LeagueTarget) -> Result<LeagueReport, IngestError> {
        let (_, adapter) = self.preflight(&target.provider_id)?;
        let data_types = adapter.supported();
        Ok(self.run_league(target, data_types).await)
    }

    /// Ingest many leagues concurrently.
    ///
    /// A target whose provider fails pre-flight (unknown provider, missing
    /// adapter or credential) gets a report with a `Configuration` failure for
    /// each data type and makes no calls; the other targets are unaffected.
    /// Fails as a whole only when the ingestor has no providers at all.
    pub async fn ingest_all(
        &self,
        targets: &[LeagueTarget],
    ) -> Result<Vec<LeagueReport>, IngestError> {
        if !targets.is_empty() && self.providers.is_empty() {
            return Err(IngestError::configuration("no providers configured"));
        }

        info!("Ingesting {} leagues", targets.len());
        let reports = join_all(targets.iter().map(|target| async move {
            match self.preflight(&target.provider_id) {
                Ok((_, adapter)) => self.run_league(target, adapter.supported()).await,
                Err(error) => {
                    warn!(
                        "Skipping league {}/{}: {}",
                        target.provider_id, target.league_id, error
                    );
                    self.rejected_league(target, &error)
                }
            }
        }))
        .await;

        let failed = reports.iter().filter(|r| !r.is_complete_success()).count();
        if failed > 0 {
            warn!("{} of {} leagues had failures", failed, reports.len());
        }
        Ok(reports)
    }

    /// Drop the cached response for `request`. Returns whether one existed.
    pub async fn invalidate(&self, request: &IngestRequest) -> Result<bool, IngestError> {
        let descriptor = self.adapters.describe(request)?;
        Ok(self.cache.delete(&descriptor).await)
    }

    async fn run_league(&self, target: &LeagueTarget, data_types: Vec<DataType>) -> LeagueReport {
        let fetches = data_types.into_iter().map(|data_type| {
            let request = target.request(data_type);
            async move {
                let (result, diagnostics) = self.fetch_traced(&request).await;
                let retries = diagnostics.retries();
                let result = match result {
                    Ok(fetched) => IngestionResult::Success {
                        data: fetched.data,
                        retries,
                        from_cache: fetched.from_cache,
                        fetched_at: fetched.fetched_at,
                    },
                    Err(error) => {
                        warn!("{} ({})", diagnostics.summary(), error);
                        IngestionResult::failure(&error, retries)
                    }
                };
                (data_type, result)
            }
        });

        let results: BTreeMap<DataType, IngestionResult> =
            join_all(fetches).await.into_iter().collect();

        LeagueReport {
            provider_id: target.provider_id.clone(),
            league_id: target.league_id.clone(),
            results,
        }
    }

    /// Report for a league whose provider failed pre-flight. Data types come
    /// from the adapter when there is one, otherwise every type is listed.
    fn rejected_league(&self, target: &LeagueTarget, error: &IngestError) -> LeagueReport {
        let data_types = self
            .adapters
            .get(&target.provider_id)
            .map_or_else(|_| DataType::ALL.to_vec(), |adapter| adapter.supported());

        LeagueReport {
            provider_id: target.provider_id.clone(),
            league_id: target.league_id.clone(),
            results: data_types
                .into_iter()
                .map(|data_type| (data_type, IngestionResult::failure(error, 0)))
                .collect(),
        }
    }

    /// Check that a provider is configured, has an adapter and carries every
    /// credential the adapter's auth scheme needs.
    fn preflight(
        &self,
        provider_id: &str,
    ) -> Result<(&ProviderConfig, &ProviderAdapter), IngestError> {
        let config = self.providers.get(provider_id)?;
        let adapter = self.adapters.get(provider_id)?;

        if let Some(missing) = adapter
            .auth
            .required_credentials()
            .into_iter()
            .find(|name| config.credentials.get(name).is_none())
        {
            return Err(IngestError::configuration(format!(
                "provider '{}' is missing credential '{}'",
                provider_id, missing
            )));
        }

        Ok((config, adapter))
    }

    async fn fetch_traced(
        &self,
        request: &IngestRequest,
    ) -> (Result<Fetched, IngestError>, FetchDiagnostics) {
        let mut diagnostics = FetchDiagnostics::new(
            request.provider_id.clone(),
            request.data_type,
            request.league_id.clone(),
        );

        let prepared = self
            .preflight(&request.provider_id)
            .and_then(|(config, _)| {
                self.adapters
                    .prepare(config, request)
                    .map(|call| (config, call))
            });
        let (config, call) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                debug!(
                    "Rejected {}/{}/{} before queueing: {}",
                    request.provider_id, request.league_id, request.data_type, error
                );
                return (Err(error), diagnostics);
            }
        };

        let key = RequestKey {
            provider_id: request.provider_id.clone(),
            league_id: request.league_id.clone(),
            data_type: request.data_type,
        };
        let started = Instant::now();
        self.events
            .emit(IngestEvent::RequestStarted { key: key.clone() });

        if let Some(cached) = self.cache.get(&call.descriptor).await {
            debug!("Cache hit for {}", call.descriptor.canonical_string());
            diagnostics.record(0, AttemptOutcome::CacheHit, started.elapsed());
            self.events.emit_batch(vec![
                IngestEvent::CacheHit { key: key.clone() },
                IngestEvent::RequestSucceeded {
                    key,
                    retries: 0,
                    from_cache: true,
                    duration_ms: millis(started),
                },
            ]);
            return (
                Ok(Fetched {
                    data: cached.data,
                    fetched_at: cached.fetched_at,
                    from_cache: true,
                }),
                diagnostics,
            );
        }

        if let Err(error) = self.circuit_breaker.check(&config.id) {
            diagnostics.record(0, AttemptOutcome::CircuitOpen, started.elapsed());
            self.events.emit(IngestEvent::RequestFailed {
                key,
                error_kind: error.kind(),
                retries: 0,
                duration_ms: millis(started),
            });
            return (Err(error), diagnostics);
        }

        let (result, retries) = self
            .run_with_retries(config, &call, &key, &mut diagnostics)
            .await;

        match result {
            Ok(data) => {
                self.circuit_breaker.record_success(&config.id);
                let fetched_at = Utc::now();
                self.cache
                    .set(&call.descriptor, data.clone(), fetched_at, config.cache_ttl())
                    .await;
                self.persist(&key, &data, fetched_at).await;

                self.events.emit(IngestEvent::RequestSucceeded {
                    key,
                    retries,
                    from_cache: false,
                    duration_ms: millis(started),
                });
                (
                    Ok(Fetched {
                        data,
                        fetched_at,
                        from_cache: false,
                    }),
                    diagnostics,
                )
            }
            Err(error) => {
                // Only exhausted transient failures say anything about provider health.
                if error.retry_class() == RetryClass::Retryable {
                    self.circuit_breaker.record_failure(&config.id);
                }
                self.events.emit(IngestEvent::RequestFailed {
                    key,
                    error_kind: error.kind(),
                    retries,
                    duration_ms: millis(started),
                });
                (Err(error), diagnostics)
            }
        }
    }

    /// Drive one queue item to a terminal state. Returns the outcome and the
    /// number of retries executed.
    async fn run_with_retries(
        &self,
        config: &ProviderConfig,
        call: &PreparedCall,
        key: &RequestKey,
        diagnostics: &mut FetchDiagnostics,
    ) -> (Result<Value, IngestError>, u32) {
        let controller = RetryController::new(config.retry_policy());
        let mut item = QueueItem::new(call.descriptor.clone());

        loop {
            let attempt_started = Instant::now();
            let outcome = self
                .rate_limiter
                .schedule(&config.id, || {
                    item.admit();
                    item.begin_execution();
                    self.execute(config, call)
                })
                .await
                .and_then(|raw| call.endpoint.extract(raw))
                .and_then(|records| match records {
                    Some(records) => self.validator.validate(call.descriptor.data_type, &records),
                    // Nothing to validate; an empty list stands for "no record yet".
                    None => Ok(Value::Null),
                });

            match outcome {
                Ok(data) => {
                    item.succeed();
                    diagnostics.record(
                        item.attempts(),
                        AttemptOutcome::Succeeded,
                        attempt_started.elapsed(),
                    );
                    return (Ok(data), item.retries());
                }
                Err(error) => {
                    let decision = controller.decide(&item, &error);
                    diagnostics.record(
                        item.attempts(),
                        AttemptOutcome::Failed {
                            kind: error.kind(),
                            message: error.to_string(),
                            will_retry: matches!(decision, RetryDecision::Retry { .. }),
                        },
                        attempt_started.elapsed(),
                    );

                    match decision {
                        RetryDecision::Retry { retry, delay } => {
                            item.schedule_retry();
                            debug!(
                                "Retrying {} in {:?} after {} (retry {}/{})",
                                call.descriptor.canonical_string(),
                                delay,
                                error,
                                retry + 1,
                                controller.policy().ceiling
                            );
                            self.events.emit(IngestEvent::RetryScheduled {
                                key: key.clone(),
                                retry,
                                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                error_kind: error.kind(),
                            });
                            sleep(delay).await;
                            item.requeue();
                        }
                        RetryDecision::GiveUp => {
                            item.fail();
                            return (Err(error), item.retries());
                        }
                    }
                }
            }
        }
    }

    /// One transport call, bounded by the provider timeout. Returns the parsed
    /// JSON document of a 2xx response.
    async fn execute(
        &self,
        config: &ProviderConfig,
        call: &PreparedCall,
    ) -> Result<Value, IngestError> {
        let response = timeout(
            config.timeout(),
            self.transport.execute(&config.id, &call.request),
        )
        .await
        .map_err(|_| IngestError::Timeout {
            provider: config.id.clone(),
            timeout: config.timeout(),
        })??;

        if !response.is_success() {
            return Err(IngestError::from_status(
                &config.id,
                response.status,
                response.retry_after,
            ));
        }

        serde_json::from_str(&response.body).map_err(|e| IngestError::Validation {
            data_type: call.descriptor.data_type,
            message: format!("response is not valid JSON: {}", e),
        })
    }

    async fn persist(&self, key: &RequestKey, data: &Value, fetched_at: DateTime<Utc>) {
        let snapshot = LeagueSnapshot {
            provider_id: key.provider_id.clone(),
            league_id: key.league_id.clone(),
            data_type: key.data_type,
            payload: data.clone(),
            fetched_at,
        };

        if let Err(e) = self.store.store(&snapshot).await {
            warn!(
                "Failed to persist {}/{}/{}: {}",
                key.provider_id, key.league_id, key.data_type, e
            );
            self.events.emit(IngestEvent::PersistFailed {
                key: key.clone(),
                message: e.to_string(),
            });
        }
    }
}

fn millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
