//! Retry controller and per-request queue item state.
//!
//! The controller never executes a call itself. It classifies a failure, computes
//! the exponential backoff and tells the orchestrator whether the queue item goes
//! back through the rate limiter or completes with the last observed error.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{IngestError, RetryClass};
use crate::models::RequestDescriptor;

/// Retry configuration for one provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub ceiling: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// What to do with a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue after `delay`. `retry` is the zero-based retry index.
    Retry { retry: u32, delay: Duration },
    /// Complete the request with the last error.
    GiveUp,
}

/// Classifies failures and computes backoff delays.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn classify(&self, error: &IngestError) -> RetryClass {
        error.retry_class()
    }

    /// `base * 2^retry`, saturating instead of overflowing.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.policy.backoff_base.saturating_mul(factor)
    }

    /// Decide the fate of `item` after it failed with `error`.
    ///
    /// A 429 carrying `Retry-After` waits at least that long.
    pub fn decide(&self, item: &QueueItem, error: &IngestError) -> RetryDecision {
        if self.classify(error) == RetryClass::Fatal {
            debug!(
                "Fatal {} for {}, not retrying",
                error.kind(),
                item.descriptor().canonical_string()
            );
            return RetryDecision::GiveUp;
        }

        let retries_so_far = item.retries();
        if retries_so_far >= self.policy.ceiling {
            warn!(
                "Retry ceiling {} reached for {} ({})",
                self.policy.ceiling,
                item.descriptor().canonical_string(),
                error
            );
            return RetryDecision::GiveUp;
        }

        let backoff = self.next_delay(retries_so_far);
        let delay = match error.retry_after() {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        };

        RetryDecision::Retry {
            retry: retries_so_far,
            delay,
        }
    }
}

/// Lifecycle of a queue item.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueState {
    Queued,
    Admitted,
    Executing,
    RetryScheduled,
    Succeeded,
    Failed,
}

impl QueueState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A descriptor in flight, exclusively owned by one fetch.
///
/// `attempts` only ever grows, and only on entry to `Executing`.
#[derive(Debug)]
pub struct QueueItem {
    descriptor: RequestDescriptor,
    attempts: u32,
    state: QueueState,
}

impl QueueItem {
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            attempts: 0,
            state: QueueState::Queued,
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Number of executed attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of executed attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn admit(&mut self) {
        self.transition(QueueState::Admitted);
    }

    pub fn begin_execution(&mut self) {
        if self.transition(QueueState::Executing) {
            self.attempts += 1;
        }
    }

    pub fn schedule_retry(&mut self) {
        self.transition(QueueState::RetryScheduled);
    }

    pub fn requeue(&mut self) {
        self.transition(QueueState::Queued);
    }

    pub fn succeed(&mut self) {
        self.transition(QueueState::Succeeded);
    }

    pub fn fail(&mut self) {
        self.transition(QueueState::Failed);
    }

    fn transition(&mut self, next: QueueState) -> bool {
        if self.state.is_terminal() {
            warn!(
                "Ignoring transition {} -> {} for finished request {}",
                self.state,
                next,
                self.descriptor.canonical_string()
            );
            return false;
        }
        debug!(
            "Request {} {} -> {}",
            self.descriptor.canonical_string(),
            self.state,
            next
        );
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataType, HttpMethod};
    use std::borrow::Cow;
    use std::collections::HashMap;

    fn item() -> QueueItem {
        QueueItem::new(RequestDescriptor {
            provider_id: Cow::Borrowed("sleeper"),
            data_type: DataType::Standings,
            league_id: "1".to_string(),
            method: HttpMethod::Get,
            path_template: "/league/{league_id}/rosters".to_string(),
            params: HashMap::new(),
            body: None,
            idempotency_key: None,
        })
    }

    fn controller(ceiling: u32, base_ms: u64) -> RetryController {
        RetryController::new(RetryPolicy {
            ceiling,
            backoff_base: Duration::from_millis(base_ms),
        })
    }

    fn run_attempt(item: &mut QueueItem) {
        item.admit();
        item.begin_execution();
    }

    #[test]
    fn test_next_delay_doubles() {
        let controller = controller(5, 1000);
        assert_eq!(controller.next_delay(0), Duration::from_millis(1000));
        assert_eq!(controller.next_delay(1), Duration::from_millis(2000));
        assert_eq!(controller.next_delay(2), Duration::from_millis(4000));
        assert_eq!(controller.next_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_next_delay_strictly_increases() {
        let controller = controller(10, 7);
        for retry in 0..20 {
            let current = controller.next_delay(retry);
            let next = controller.next_delay(retry + 1);
            assert!(next > current, "retry {}", retry);
            assert_eq!(current, Duration::from_millis(7) * 2u32.pow(retry));
        }
    }

    #[test]
    fn test_next_delay_saturates() {
        let controller = controller(10, 1000);
        assert_eq!(controller.next_delay(64), Duration::from_millis(1000).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_fatal_gives_up_immediately() {
        let controller = controller(3, 100);
        let mut item = item();
        run_attempt(&mut item);

        let error = IngestError::from_status("sleeper", 404, None);
        assert_eq!(controller.decide(&item, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retryable_retries_until_ceiling() {
        let controller = controller(3, 100);
        let mut item = item();
        let error = IngestError::from_status("sleeper", 503, None);

        let mut delays = Vec::new();
        loop {
            run_attempt(&mut item);
            match controller.decide(&item, &error) {
                RetryDecision::Retry { delay, .. } => {
                    item.schedule_retry();
                    item.requeue();
                    delays.push(delay);
                }
                RetryDecision::GiveUp => {
                    item.fail();
                    break;
                }
            }
        }

        assert_eq!(item.attempts(), 4);
        assert_eq!(item.retries(), 3);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        let controller = controller(0, 100);
        let mut item = item();
        run_attempt(&mut item);
        let error = IngestError::from_status("sleeper", 500, None);
        assert_eq!(controller.decide(&item, &error), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let controller = controller(3, 100);
        let mut item = item();
        run_attempt(&mut item);

        let error = IngestError::from_status("espn", 429, Some(Duration::from_secs(2)));
        assert_eq!(
            controller.decide(&item, &error),
            RetryDecision::Retry {
                retry: 0,
                delay: Duration::from_secs(2)
            }
        );

        // A hint shorter than the backoff does not shorten it.
        let error = IngestError::from_status("espn", 429, Some(Duration::from_millis(10)));
        assert_eq!(
            controller.decide(&item, &error),
            RetryDecision::Retry {
                retry: 0,
                delay: Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut item = item();
        run_attempt(&mut item);
        item.succeed();
        item.requeue();
        assert_eq!(item.state(), QueueState::Succeeded);
        assert_eq!(item.attempts(), 1);
    }
}
