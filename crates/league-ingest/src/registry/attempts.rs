//! Attempt tracking for fetch diagnostics.

use std::time::Duration;

use crate::errors::ErrorKind;
use crate::models::{DataType, ProviderId};

/// How a single fetch step ended.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    /// Served from cache, no transport call.
    CacheHit,

    /// Rejected before admission because the provider's circuit is open.
    CircuitOpen,

    /// The call failed; `will_retry` tells whether the item was re-queued.
    Failed {
        kind: ErrorKind,
        message: String,
        will_retry: bool,
    },

    /// The call returned a payload that passed validation.
    Succeeded,
}

/// Record of one step taken while fetching a descriptor.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    /// 1-based transport attempt, 0 for steps that never reached the transport.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Everything that happened while fetching one (provider, data type, league).
#[derive(Clone, Debug)]
pub struct FetchDiagnostics {
    pub provider_id: ProviderId,
    pub data_type: DataType,
    pub league_id: String,
    pub attempts: Vec<AttemptRecord>,
}

impl FetchDiagnostics {
    pub fn new(provider_id: ProviderId, data_type: DataType, league_id: impl Into<String>) -> Self {
        Self {
            provider_id,
            data_type,
            league_id: league_id.into(),
            attempts: Vec::new(),
        }
    }

    pub fn record(&mut self, attempt: u32, outcome: AttemptOutcome, elapsed: Duration) {
        self.attempts.push(AttemptRecord {
            attempt,
            outcome,
            elapsed,
        });
    }

    /// Transport attempts actually executed.
    pub fn executed(&self) -> u32 {
        self.attempts
            .iter()
            .map(|a| a.attempt)
            .max()
            .unwrap_or(0)
    }

    /// Executed attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.executed().saturating_sub(1)
    }

    pub fn from_cache(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::CacheHit)
    }

    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.outcome, AttemptOutcome::Succeeded | AttemptOutcome::CacheHit))
    }

    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        let steps = self
            .attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::CacheHit => "CACHE HIT".to_string(),
                AttemptOutcome::CircuitOpen => "CIRCUIT OPEN".to_string(),
                AttemptOutcome::Succeeded => format!("#{}: SUCCESS", a.attempt),
                AttemptOutcome::Failed {
                    kind, will_retry, ..
                } => {
                    if *will_retry {
                        format!("#{}: {} (retrying)", a.attempt, kind)
                    } else {
                        format!("#{}: {}", a.attempt, kind)
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ");

        format!(
            "{}/{}/{}: {}",
            self.provider_id, self.league_id, self.data_type, steps
        )
    }
}
