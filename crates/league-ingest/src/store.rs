//! Persistence collaborator.
//!
//! The ingestion layer hands every freshly validated payload to a
//! [`SnapshotStore`]. A store error is logged and reported as an event; it
//! never turns a successful fetch into a failure.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DataType, LeagueSnapshot};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Snapshot rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn store(&self, snapshot: &LeagueSnapshot) -> Result<(), StoreError>;
}

/// Accepts and discards every snapshot.
#[derive(Clone, Default)]
pub struct NoOpSnapshotStore;

#[async_trait]
impl SnapshotStore for NoOpSnapshotStore {
    async fn store(&self, _snapshot: &LeagueSnapshot) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Keeps every snapshot in memory, in arrival order.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<Vec<LeagueSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LeagueSnapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshots(&self) -> Vec<LeagueSnapshot> {
        self.lock().clone()
    }

    /// Most recent snapshot for a league and data type.
    pub fn latest(&self, league_id: &str, data_type: DataType) -> Option<LeagueSnapshot> {
        self.lock()
            .iter()
            .rev()
            .find(|s| s.league_id == league_id && s.data_type == data_type)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn store(&self, snapshot: &LeagueSnapshot) -> Result<(), StoreError> {
        self.lock().push(snapshot.clone());
        Ok(())
    }
}
