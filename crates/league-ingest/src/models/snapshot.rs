use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::data_type::DataType;
use super::types::{LeagueId, ProviderId};

/// A validated payload handed to the persistence collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueSnapshot {
    pub provider_id: ProviderId,
    pub league_id: LeagueId,
    pub data_type: DataType,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}
