use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use serde_json::Value;

use super::data_type::DataType;
use super::types::{LeagueId, ProviderId};
use crate::errors::{ErrorKind, IngestError};

/// A single-request ingestion input.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub provider_id: ProviderId,
    pub data_type: DataType,
    pub league_id: LeagueId,
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Sent with mutating endpoints so a retried write is applied once.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl IngestRequest {
    pub fn new(
        provider_id: impl Into<ProviderId>,
        data_type: DataType,
        league_id: impl Into<LeagueId>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            data_type,
            league_id: league_id.into(),
            params: HashMap::new(),
            idempotency_key: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// One league to ingest in bulk. `params` is shared by every data type
/// (season, week, round, ...).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueTarget {
    pub provider_id: ProviderId,
    pub league_id: LeagueId,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl LeagueTarget {
    pub fn new(provider_id: impl Into<ProviderId>, league_id: impl Into<LeagueId>) -> Self {
        Self {
            provider_id: provider_id.into(),
            league_id: league_id.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub(crate) fn request(&self, data_type: DataType) -> IngestRequest {
        IngestRequest {
            provider_id: self.provider_id.clone(),
            data_type,
            league_id: self.league_id.clone(),
            params: self.params.clone(),
            idempotency_key: None,
        }
    }
}

/// Outcome for one (league, data type) pair.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestionResult {
    Success {
        data: Value,
        retries: u32,
        from_cache: bool,
        fetched_at: DateTime<Utc>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
        retries: u32,
    },
}

impl IngestionResult {
    pub(crate) fn failure(error: &IngestError, retries: u32) -> Self {
        Self::Failure {
            kind: error.kind(),
            message: error.to_string(),
            retries,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            Self::Success { retries, .. } | Self::Failure { retries, .. } => *retries,
        }
    }
}

// Wire form: `{ ok: true, data, ... }` or `{ ok: false, errorKind, message, ... }`.
impl Serialize for IngestionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success {
                data,
                retries,
                from_cache,
                fetched_at,
            } => {
                let mut state = serializer.serialize_struct("IngestionResult", 5)?;
                state.serialize_field("ok", &true)?;
                state.serialize_field("data", data)?;
                state.serialize_field("retries", retries)?;
                state.serialize_field("fromCache", from_cache)?;
                state.serialize_field("fetchedAt", fetched_at)?;
                state.end()
            }
            Self::Failure {
                kind,
                message,
                retries,
            } => {
                let mut state = serializer.serialize_struct("IngestionResult", 4)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field("errorKind", kind)?;
                state.serialize_field("message", message)?;
                state.serialize_field("retries", retries)?;
                state.end()
            }
        }
    }
}

/// Aggregate result of ingesting every supported data type for one league.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueReport {
    pub provider_id: ProviderId,
    pub league_id: LeagueId,
    pub results: BTreeMap<DataType, IngestionResult>,
}

impl LeagueReport {
    pub fn succeeded(&self) -> Vec<DataType> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(dt, _)| *dt)
            .collect()
    }

    pub fn failed(&self) -> Vec<DataType> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_ok())
            .map(|(dt, _)| *dt)
            .collect()
    }

    pub fn is_complete_success(&self) -> bool {
        self.results.values().all(IngestionResult::is_ok)
    }
}
