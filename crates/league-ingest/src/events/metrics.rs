//! Counters and the duration histogram, fed from ingestion events.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::sink::IngestEventSink;
use super::IngestEvent;

/// Upper bounds, in seconds, of the `ingestion_duration_seconds` buckets.
/// A final `+Inf` bucket catches everything above the last bound.
pub const DURATION_BUCKETS: [f64; 8] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Aggregates events into counters. Lock-free; share it behind an `Arc`.
pub struct IngestMetrics {
    requests_total: AtomicU64,
    success_total: AtomicU64,
    failure_total: AtomicU64,
    cache_hits_total: AtomicU64,
    retries_total: AtomicU64,
    persist_failures_total: AtomicU64,
    /// Per-bucket (non-cumulative) counts, `+Inf` last.
    duration_buckets: [AtomicU64; DURATION_BUCKETS.len() + 1],
    duration_sum_ms: AtomicU64,
}

/// Cumulative histogram view, Prometheus style.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds in seconds; the implicit last bucket is `+Inf`.
    pub bounds: Vec<f64>,
    /// Cumulative counts, one per bound plus the `+Inf` bucket.
    pub cumulative_counts: Vec<u64>,
    pub count: u64,
    pub sum_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub success_total: u64,
    pub failure_total: u64,
    pub cache_hits_total: u64,
    pub retries_total: u64,
    pub persist_failures_total: u64,
    pub ingestion_duration_seconds: HistogramSnapshot,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            cache_hits_total: AtomicU64::new(0),
            retries_total: AtomicU64::new(0),
            persist_failures_total: AtomicU64::new(0),
            duration_buckets: Default::default(),
            duration_sum_ms: AtomicU64::new(0),
        }
    }

    fn observe_duration(&self, duration_ms: u64) {
        let seconds = duration_ms as f64 / 1000.0;
        let index = DURATION_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(DURATION_BUCKETS.len());
        self.duration_buckets[index].fetch_add(1, Ordering::Relaxed);
        self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut running = 0;
        let cumulative_counts: Vec<u64> = self
            .duration_buckets
            .iter()
            .map(|bucket| {
                running += bucket.load(Ordering::Relaxed);
                running
            })
            .collect();

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            success_total: self.success_total.load(Ordering::Relaxed),
            failure_total: self.failure_total.load(Ordering::Relaxed),
            cache_hits_total: self.cache_hits_total.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            persist_failures_total: self.persist_failures_total.load(Ordering::Relaxed),
            ingestion_duration_seconds: HistogramSnapshot {
                bounds: DURATION_BUCKETS.to_vec(),
                count: running,
                cumulative_counts,
                sum_seconds: self.duration_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            },
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestEventSink for IngestMetrics {
    fn emit(&self, event: IngestEvent) {
        match event {
            IngestEvent::RequestStarted { .. } => {
                self.requests_total.fetch_add(1, Ordering::Relaxed);
            }
            IngestEvent::CacheHit { .. } => {
                self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
            }
            IngestEvent::RetryScheduled { .. } => {
                self.retries_total.fetch_add(1, Ordering::Relaxed);
            }
            IngestEvent::RequestSucceeded { duration_ms, .. } => {
                self.success_total.fetch_add(1, Ordering::Relaxed);
                self.observe_duration(duration_ms);
            }
            IngestEvent::RequestFailed { duration_ms, .. } => {
                self.failure_total.fetch_add(1, Ordering::Relaxed);
                self.observe_duration(duration_ms);
            }
            IngestEvent::PersistFailed { .. } => {
                self.persist_failures_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::events::RequestKey;
    use crate::models::DataType;

    fn key() -> RequestKey {
        RequestKey {
            provider_id: "espn".into(),
            league_id: "99".to_string(),
            data_type: DataType::Matchups,
        }
    }

    fn succeeded(duration_ms: u64) -> IngestEvent {
        IngestEvent::RequestSucceeded {
            key: key(),
            retries: 0,
            from_cache: false,
            duration_ms,
        }
    }

    #[test]
    fn test_counters() {
        let metrics = IngestMetrics::new();
        metrics.emit_batch(vec![
            IngestEvent::RequestStarted { key: key() },
            IngestEvent::RetryScheduled {
                key: key(),
                retry: 0,
                delay_ms: 500,
                error_kind: ErrorKind::UpstreamServer,
            },
            succeeded(120),
            IngestEvent::RequestStarted { key: key() },
            IngestEvent::RequestFailed {
                key: key(),
                error_kind: ErrorKind::UpstreamClient,
                retries: 0,
                duration_ms: 30,
            },
        ]);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.success_total, 1);
        assert_eq!(snapshot.failure_total, 1);
        assert_eq!(snapshot.retries_total, 1);
        assert_eq!(snapshot.cache_hits_total, 0);
    }

    #[test]
    fn test_histogram_buckets() {
        let metrics = IngestMetrics::new();
        for duration_ms in [10, 50, 300, 4_000, 60_000] {
            metrics.emit(succeeded(duration_ms));
        }

        let histogram = metrics.snapshot().ingestion_duration_seconds;
        assert_eq!(histogram.count, 5);
        assert_eq!(histogram.cumulative_counts.len(), DURATION_BUCKETS.len() + 1);
        // <=0.05s: 10ms and 50ms
        assert_eq!(histogram.cumulative_counts[0], 2);
        // <=0.5s adds 300ms
        assert_eq!(histogram.cumulative_counts[3], 3);
        // <=5s adds 4s
        assert_eq!(histogram.cumulative_counts[6], 4);
        assert_eq!(histogram.cumulative_counts[7], 4);
        assert_eq!(histogram.cumulative_counts[8], 5);
        assert!((histogram.sum_seconds - 64.36).abs() < 1e-9);
    }
}
