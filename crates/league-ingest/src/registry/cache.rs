//! In-memory response cache with per-entry TTL using moka

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;

use crate::models::RequestDescriptor;

/// A validated payload and when it was fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedPayload {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedPayload {
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Expires each entry after the TTL it was stored with.
struct PayloadExpiry;

impl Expiry<String, CachedPayload> for PayloadExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPayload,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Response cache keyed by descriptor.
///
/// Only read (`GET`) descriptors are ever stored. A zero TTL means "do not
/// cache" and drops whatever was stored under the key.
pub struct ResponseCache {
    entries: Cache<String, CachedPayload>,
}

impl ResponseCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PayloadExpiry)
                .build(),
        }
    }

    /// Unexpired payload for `descriptor`, if any.
    pub async fn get(&self, descriptor: &RequestDescriptor) -> Option<CachedPayload> {
        if !descriptor.is_cacheable() {
            return None;
        }
        self.entries.get(&descriptor.cache_key()).await
    }

    /// Store `data` for `descriptor`, replacing any previous entry.
    ///
    /// Returns whether the payload was stored.
    pub async fn set(
        &self,
        descriptor: &RequestDescriptor,
        data: Value,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> bool {
        if !descriptor.is_cacheable() {
            return false;
        }

        let key = descriptor.cache_key();
        if ttl.is_zero() {
            self.entries.invalidate(&key).await;
            return false;
        }

        debug!(
            "Caching {} for {:?}",
            descriptor.canonical_string(),
            ttl
        );
        self.entries
            .insert(
                key,
                CachedPayload {
                    data,
                    fetched_at,
                    ttl,
                },
            )
            .await;
        true
    }

    /// Remove the entry for `descriptor`. Returns whether one existed.
    pub async fn delete(&self, descriptor: &RequestDescriptor) -> bool {
        self.entries.remove(&descriptor.cache_key()).await.is_some()
    }

    /// Drop every entry, returning how many live entries were removed.
    pub async fn clear(&self) -> usize {
        self.entries.run_pending_tasks().await;
        let count = self.entries.iter().count();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        count
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}
