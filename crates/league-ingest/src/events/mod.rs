//! Ingestion events.
//!
//! The orchestrator reports what it does through an [`IngestEventSink`]. Sinks
//! decide delivery: drop, collect, publish on a channel or aggregate into
//! [`IngestMetrics`].

mod metrics;
mod sink;

pub use metrics::{HistogramSnapshot, IngestMetrics, MetricsSnapshot, DURATION_BUCKETS};
pub use sink::{ChannelEventSink, FanoutSink, IngestEventSink, MockEventSink, NoOpEventSink};

use serde::Serialize;

use crate::errors::ErrorKind;
use crate::models::{DataType, LeagueId, ProviderId};

/// Identifies the (provider, league, data type) an event is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestKey {
    pub provider_id: ProviderId,
    pub league_id: LeagueId,
    pub data_type: DataType,
}

/// Something the orchestrator did.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    /// A fetch began. Emitted once per fetch, not per attempt.
    RequestStarted { key: RequestKey },

    /// The fetch was served from cache.
    CacheHit { key: RequestKey },

    /// An attempt failed and will be retried after `delay_ms`.
    RetryScheduled {
        key: RequestKey,
        retry: u32,
        delay_ms: u64,
        error_kind: ErrorKind,
    },

    RequestSucceeded {
        key: RequestKey,
        retries: u32,
        from_cache: bool,
        duration_ms: u64,
    },

    RequestFailed {
        key: RequestKey,
        error_kind: ErrorKind,
        retries: u32,
        duration_ms: u64,
    },

    /// The payload was fetched and validated but the store rejected it.
    PersistFailed { key: RequestKey, message: String },
}

impl IngestEvent {
    pub fn key(&self) -> &RequestKey {
        match self {
            Self::RequestStarted { key }
            | Self::CacheHit { key }
            | Self::RetryScheduled { key, .. }
            | Self::RequestSucceeded { key, .. }
            | Self::RequestFailed { key, .. }
            | Self::PersistFailed { key, .. } => key,
        }
    }
}
