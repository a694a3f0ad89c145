/// Classification for retry policy.
///
/// Used by the retry controller to decide whether a failed attempt is re-admitted
/// through the rate limiter or completes the request.
///
/// # Behavior Summary
///
/// | Class | Re-admitted? | Counts against circuit breaker when exhausted? |
/// |-------|--------------|------------------------------------------------|
/// | `Retryable` | Yes, after backoff, until the ceiling | Yes |
/// | `Fatal` | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure: no response, timeout, 5xx, 429 or anything unclassifiable.
    Retryable,

    /// The request is fundamentally invalid or the upstream contract was violated.
    /// Retrying won't help.
    Fatal,
}
