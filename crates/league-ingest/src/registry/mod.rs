//! Ingestion orchestration.
//!
//! This module holds the resilience machinery shared by every provider:
//! - Response caching with per-entry TTL
//! - Per-provider rate limiting (concurrency and spacing)
//! - Retry classification and exponential backoff
//! - Circuit breaking for providers that keep failing
//! - Schema validation of payloads
//!
//! The [`Ingestor`] ties them together.

mod attempts;
mod cache;
mod circuit_breaker;
mod ingestor;
mod rate_limiter;
mod retry;
mod validator;

pub use attempts::{AttemptOutcome, AttemptRecord, FetchDiagnostics};
pub use cache::{CachedPayload, ResponseCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use ingestor::Ingestor;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{QueueItem, QueueState, RetryController, RetryDecision, RetryPolicy};
pub use validator::{
    schema_for, FieldKind, FieldSpec, RecordSchema, SchemaValidator, ValidationIssue,
    ValidationSeverity, ValidatorConfig,
};
