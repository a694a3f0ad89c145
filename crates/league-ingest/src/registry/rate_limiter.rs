//! Per-provider admission control.
//!
//! Each provider gets its own lane with two gates:
//! - a fair semaphore bounding how many tasks execute at once
//! - a pacing gate forcing a minimum gap between consecutive task starts
//!
//! Both gates are FIFO, so admission within a provider follows submission order.
//! Lanes are independent: a saturated provider never blocks another one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::{sleep_until, Instant};

use crate::errors::IngestError;

/// Default concurrency when a provider was never configured.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default spacing between call starts when a provider was never configured.
const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(100);

/// Rate limiter configuration for a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum tasks executing simultaneously.
    pub max_concurrent: usize,
    /// Minimum time between two task starts.
    pub min_spacing: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_spacing: DEFAULT_MIN_SPACING,
        }
    }
}

/// Admission state for a single provider.
#[derive(Debug)]
struct ProviderLane {
    config: RateLimitConfig,
    permits: Semaphore,
    /// Start time of the most recently admitted task.
    last_start: AsyncMutex<Option<Instant>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ProviderLane {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            last_start: AsyncMutex::new(None),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Wait until `min_spacing` has passed since the previous start, then claim
    /// the start slot. Holding the async mutex while sleeping keeps waiters in order.
    async fn pace(&self, provider: &str) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.config.min_spacing;
            if ready_at > Instant::now() {
                debug!(
                    "Rate limiter: pacing '{}' for {:?}",
                    provider,
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}

/// Decrements the in-flight gauge even if the task future is dropped.
struct InFlightGuard<'a> {
    lane: &'a ProviderLane,
}

impl<'a> InFlightGuard<'a> {
    fn enter(lane: &'a ProviderLane) -> Self {
        let now = lane.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        lane.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { lane }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.lane.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-provider rate limiter.
///
/// Thread-safe; lanes are created on demand with default settings, or can be
/// pre-configured with [`configure`](Self::configure).
pub struct RateLimiter {
    lanes: Mutex<HashMap<String, Arc<ProviderLane>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the lanes mutex, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the map only holds `Arc`s to lanes whose own
    /// state lives behind async primitives.
    fn lock_lanes(&self) -> MutexGuard<'_, HashMap<String, Arc<ProviderLane>>> {
        self.lanes.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter lanes mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for a provider.
    ///
    /// Replaces the lane; tasks already admitted on the old lane finish under
    /// the old limits.
    pub fn configure(&self, provider: &str, config: RateLimitConfig) {
        let mut lanes = self.lock_lanes();
        lanes.insert(provider.to_string(), Arc::new(ProviderLane::new(config)));
    }

    fn lane(&self, provider: &str) -> Arc<ProviderLane> {
        let mut lanes = self.lock_lanes();
        lanes
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(ProviderLane::new(RateLimitConfig::default())))
            .clone()
    }

    /// Run `task` once the provider admits it.
    ///
    /// The task is not invoked until a concurrency permit is held and the pacing
    /// gap has elapsed. Dropping the returned future while still queued withdraws
    /// the task without running it; once running it cannot be recalled.
    pub async fn schedule<F, Fut, T>(&self, provider: &str, task: F) -> Result<T, IngestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let lane = self.lane(provider);

        let _permit = lane
            .permits
            .acquire()
            .await
            .map_err(|_| IngestError::Unclassified {
                provider: provider.to_string(),
                message: "admission queue closed".to_string(),
            })?;

        lane.pace(provider).await;

        let _in_flight = InFlightGuard::enter(&lane);
        debug!(
            "Rate limiter: admitted task for '{}' ({}/{} in flight)",
            provider,
            lane.in_flight.load(Ordering::SeqCst),
            lane.config.max_concurrent
        );

        task().await
    }

    /// Tasks currently executing for a provider.
    pub fn in_flight(&self, provider: &str) -> usize {
        let lanes = self.lock_lanes();
        lanes
            .get(provider)
            .map(|lane| lane.in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Highest number of tasks ever executing at once for a provider.
    pub fn peak_in_flight(&self, provider: &str) -> usize {
        let lanes = self.lock_lanes();
        lanes
            .get(provider)
            .map(|lane| lane.peak_in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Configured limits for a provider, or the defaults.
    pub fn config(&self, provider: &str) -> RateLimitConfig {
        let lanes = self.lock_lanes();
        lanes
            .get(provider)
            .map(|lane| lane.config)
            .unwrap_or_default()
    }

    /// Drop the lane for a provider; the next task recreates it with defaults.
    pub fn reset(&self, provider: &str) {
        let mut lanes = self.lock_lanes();
        lanes.remove(provider);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex as StdMutex;

    fn limiter_with(provider: &str, max_concurrent: usize, spacing_ms: u64) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.configure(
            provider,
            RateLimitConfig {
                max_concurrent,
                min_spacing: Duration::from_millis(spacing_ms),
            },
        );
        limiter
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_concurrency() {
        let limiter = limiter_with("sleeper", 3, 0);
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let tasks = (0..10).map(|_| {
            limiter.schedule("sleeper", || async {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, IngestError>(())
            })
        });
        let results = join_all(tasks).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.peak_in_flight("sleeper"), 3);
        assert_eq!(limiter.in_flight("sleeper"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_between_starts() {
        let limiter = limiter_with("espn", 10, 200);
        let starts = StdMutex::new(Vec::new());

        let tasks = (0..4).map(|_| {
            limiter.schedule("espn", || async {
                starts.lock().unwrap().push(Instant::now());
                Ok::<_, IngestError>(())
            })
        });
        join_all(tasks).await;

        let starts = starts.into_inner().unwrap();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_admission_order() {
        let limiter = limiter_with("sleeper", 1, 0);
        let order = StdMutex::new(Vec::new());

        let tasks = (0..6).map(|i| {
            let order = &order;
            limiter.schedule("sleeper", move || async move {
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, IngestError>(())
            })
        });
        join_all(tasks).await;

        assert_eq!(order.into_inner().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_isolation() {
        let limiter = RateLimiter::new();
        limiter.configure(
            "slow",
            RateLimitConfig {
                max_concurrent: 1,
                min_spacing: Duration::ZERO,
            },
        );
        limiter.configure(
            "fast",
            RateLimitConfig {
                max_concurrent: 1,
                min_spacing: Duration::ZERO,
            },
        );

        let started = Instant::now();
        let slow = limiter.schedule("slow", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, IngestError>(())
        });
        let fast = limiter.schedule("fast", || async { Ok::<_, IngestError>(Instant::now()) });

        let (slow_result, fast_result) = tokio::join!(slow, fast);
        assert!(slow_result.is_ok());
        let fast_started = fast_result.unwrap();
        assert!(fast_started - started < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_error_is_returned() {
        let limiter = limiter_with("sleeper", 1, 0);
        let result: Result<(), IngestError> = limiter
            .schedule("sleeper", || async {
                Err(IngestError::from_status("sleeper", 503, None))
            })
            .await;
        assert!(matches!(
            result,
            Err(IngestError::UpstreamServer { status: 503, .. })
        ));
        assert_eq!(limiter.in_flight("sleeper"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_queued_task_never_runs() {
        let limiter = limiter_with("sleeper", 1, 0);
        let ran = AtomicUsize::new(0);

        let blocker = limiter.schedule("sleeper", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, IngestError>(())
        });
        let queued = limiter.schedule("sleeper", || async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, IngestError>(())
        });

        // The queued task is abandoned after one second, while the blocker still runs.
        let (blocker_result, queued_result) = tokio::join!(
            blocker,
            tokio::time::timeout(Duration::from_secs(1), queued)
        );
        assert!(blocker_result.is_ok());
        assert!(queued_result.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unconfigured_provider_uses_defaults() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.config("unknown"), RateLimitConfig::default());
        assert_eq!(limiter.in_flight("unknown"), 0);
    }
}
