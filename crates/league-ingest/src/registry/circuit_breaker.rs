//! Per-provider circuit breaker.
//!
//! A provider that keeps exhausting its retries is taken out of rotation for a
//! while, so bulk ingestion stops hammering it. The circuit has three states:
//!
//! - **Closed**: calls go through.
//! - **Open**: calls fail fast with [`IngestError::CircuitOpen`].
//! - **HalfOpen**: probe calls go through; enough successes close the circuit.
//!
//! State is in-memory and per [`Ingestor`](crate::registry::Ingestor) instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::errors::IngestError;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failed fetches.
    failures: u32,
    /// Consecutive successes while HalfOpen.
    probe_successes: u32,
    opened_at: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            probe_successes: 0,
            opened_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.probe_successes = 0;
        self.opened_at = Some(Instant::now());
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failures = 0;
        self.probe_successes = 0;
        self.opened_at = None;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive exhausted fetches before opening.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing.
    pub recovery_timeout: Duration,
    /// Probe successes needed to close from HalfOpen.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

/// Point-in-time view of one provider's circuit.
#[derive(Clone, Debug)]
pub struct CircuitStatus {
    pub provider: String,
    pub state: CircuitState,
    pub failures: u32,
}

pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit table lock poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Run `f` on the provider's circuit, creating a closed one on first use.
    fn with_circuit<R>(&self, provider: &str, f: impl FnOnce(&mut Circuit) -> R) -> R {
        let mut circuits = self.lock_circuits();
        f(circuits.entry(provider.to_string()).or_insert_with(Circuit::new))
    }

    /// Fail fast if the provider's circuit is open.
    ///
    /// An open circuit whose recovery timeout elapsed moves to HalfOpen and
    /// lets the call through as a probe.
    pub fn check(&self, provider: &str) -> Result<(), IngestError> {
        let recovery = self.config.recovery_timeout;
        self.with_circuit(provider, |circuit| {
            if circuit.state != CircuitState::Open {
                return Ok(());
            }
            let cooling = circuit.opened_at.is_some_and(|at| at.elapsed() < recovery);
            if cooling {
                return Err(IngestError::CircuitOpen {
                    provider: provider.to_string(),
                });
            }
            info!("'{}' circuit half-open, allowing a probe", provider);
            circuit.state = CircuitState::HalfOpen;
            circuit.probe_successes = 0;
            Ok(())
        })
    }

    pub fn record_success(&self, provider: &str) {
        let needed = self.config.half_open_success_threshold;
        self.with_circuit(provider, |circuit| match circuit.state {
            CircuitState::Closed => circuit.failures = 0,
            CircuitState::HalfOpen => {
                circuit.probe_successes += 1;
                debug!(
                    "'{}' probe succeeded ({}/{})",
                    provider, circuit.probe_successes, needed
                );
                if circuit.probe_successes >= needed {
                    info!("'{}' circuit closed", provider);
                    circuit.close();
                }
            }
            // A call admitted just before the circuit opened.
            CircuitState::Open => {}
        })
    }

    pub fn record_failure(&self, provider: &str) {
        let threshold = self.config.failure_threshold;
        self.with_circuit(provider, |circuit| {
            circuit.failures += 1;
            match circuit.state {
                CircuitState::Closed if circuit.failures >= threshold => {
                    info!(
                        "'{}' circuit opened after {} consecutive failures",
                        provider, circuit.failures
                    );
                    circuit.open();
                }
                CircuitState::Closed => debug!(
                    "'{}' failure {}/{} toward opening the circuit",
                    provider, circuit.failures, threshold
                ),
                CircuitState::HalfOpen => {
                    info!("'{}' probe failed, circuit reopened", provider);
                    circuit.open();
                }
                CircuitState::Open => {}
            }
        })
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock_circuits()
            .get(provider)
            .map_or(CircuitState::Closed, |c| c.state)
    }

    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            info!("'{}' circuit reset", provider);
            circuit.close();
        }
    }

    pub fn statuses(&self) -> Vec<CircuitStatus> {
        let circuits = self.lock_circuits();
        let mut statuses: Vec<CircuitStatus> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitStatus {
                provider: provider.clone(),
                state: circuit.state,
                failures: circuit.failures,
            })
            .collect();
        statuses.sort_by(|a, b| a.provider.cmp(&b.provider));
        statuses
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64, probes: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            half_open_success_threshold: probes,
        })
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(cb.check("sleeper").is_ok());
        assert_eq!(cb.state("sleeper"), CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_threshold_and_fails_fast() {
        let cb = breaker(3, 60_000, 2);

        cb.record_failure("espn");
        cb.record_failure("espn");
        assert!(cb.check("espn").is_ok());

        cb.record_failure("espn");
        assert_eq!(cb.state("espn"), CircuitState::Open);
        assert_eq!(
            cb.check("espn"),
            Err(IngestError::CircuitOpen {
                provider: "espn".to_string()
            })
        );
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker(3, 60_000, 2);
        cb.record_failure("espn");
        cb.record_failure("espn");
        cb.record_success("espn");
        cb.record_failure("espn");
        cb.record_failure("espn");
        assert_eq!(cb.state("espn"), CircuitState::Closed);
    }

    #[test]
    fn test_probe_successes_close_circuit() {
        let cb = breaker(1, 10, 2);
        cb.record_failure("espn");
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.check("espn").is_ok());
        assert_eq!(cb.state("espn"), CircuitState::HalfOpen);

        cb.record_success("espn");
        assert_eq!(cb.state("espn"), CircuitState::HalfOpen);
        cb.record_success("espn");
        assert_eq!(cb.state("espn"), CircuitState::Closed);
    }

    #[test]
    fn test_probe_failure_reopens() {
        let cb = breaker(1, 10, 2);
        cb.record_failure("espn");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.check("espn").is_ok());

        cb.record_failure("espn");
        assert_eq!(cb.state("espn"), CircuitState::Open);
        assert!(cb.check("espn").is_err());
    }

    #[test]
    fn test_providers_are_isolated() {
        let cb = breaker(1, 60_000, 1);
        cb.record_failure("espn");
        assert!(cb.check("espn").is_err());
        assert!(cb.check("sleeper").is_ok());
    }

    #[test]
    fn test_reset_and_statuses() {
        let cb = breaker(1, 60_000, 1);
        cb.record_failure("espn");
        cb.record_success("sleeper");

        let statuses = cb.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].provider, "espn");
        assert_eq!(statuses[0].state, CircuitState::Open);

        cb.reset("espn");
        assert_eq!(cb.state("espn"), CircuitState::Closed);
    }
}
