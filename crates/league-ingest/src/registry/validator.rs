//! Payload schema validation.
//!
//! Every data type has an explicit contract:
//! - standings, matchups, transactions: an ordered sequence of records
//! - drafts, analytics: a single record
//!
//! Providers name things differently, so each canonical field lists the paths
//! (dotted, for nested objects) it may be read from. The sanitized output only
//! carries canonical field names; everything else is stripped.

use log::warn;
use serde_json::{Map, Value};

use crate::errors::IngestError;
use crate::models::{DataType, PayloadShape};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject the payload.
    Hard,
    /// Soft warning - accept the payload but log.
    Soft,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message: message.into(),
        }
    }

    fn soft(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message: message.into(),
        }
    }
}

/// Expected JSON type of a canonical field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Non-empty string or integer; normalized to a string.
    Id,
    /// Whole number.
    Integer,
    /// Any number.
    Number,
    Text,
    Bool,
    List,
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::Id => "an identifier",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Text => "a string",
            Self::Bool => "a boolean",
            Self::List => "a list",
        }
    }

    /// Coerce `value` into the canonical form, or `None` on a type mismatch.
    fn sanitize(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Id, Value::String(s)) if !s.trim().is_empty() => Some(Value::String(s.clone())),
            (Self::Id, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Some(Value::String(n.to_string()))
            }
            (Self::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Some(value.clone())
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64))
                }
            }
            (Self::Number, Value::Number(_)) => Some(value.clone()),
            (Self::Text, Value::String(_)) => Some(value.clone()),
            (Self::Bool, Value::Bool(_)) => Some(value.clone()),
            (Self::List, Value::Array(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

/// One canonical field of a record.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Source paths, tried in order; the first one present wins.
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    const fn required(name: &'static str, aliases: &'static [&'static str], kind: FieldKind) -> Self {
        Self {
            name,
            aliases,
            kind,
            required: true,
        }
    }

    const fn optional(name: &'static str, aliases: &'static [&'static str], kind: FieldKind) -> Self {
        Self {
            name,
            aliases,
            kind,
            required: false,
        }
    }

    /// First alias present in `record`, with the path it was found at.
    fn lookup<'a>(&self, record: &'a Map<String, Value>) -> Option<(&'static str, &'a Value)> {
        self.aliases
            .iter()
            .find_map(|path| resolve_path(record, path).map(|value| (*path, value)))
    }
}

fn resolve_path<'a>(record: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Canonical shape of one record.
#[derive(Debug)]
pub struct RecordSchema {
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    /// Whether a top-level key of a raw record feeds some canonical field.
    fn consumes(&self, key: &str) -> bool {
        self.fields.iter().any(|field| {
            field
                .aliases
                .iter()
                .any(|path| path.split('.').next() == Some(key))
        })
    }
}

use FieldKind::*;

static STANDINGS: RecordSchema = RecordSchema {
    fields: &[
        FieldSpec::required("team_id", &["team_id", "roster_id", "id"], Id),
        FieldSpec::required(
            "wins",
            &["wins", "settings.wins", "record.overall.wins", "recordOverall.wins"],
            Integer,
        ),
        FieldSpec::required(
            "losses",
            &["losses", "settings.losses", "record.overall.losses", "recordOverall.losses"],
            Integer,
        ),
        FieldSpec::optional(
            "ties",
            &["ties", "settings.ties", "record.overall.ties", "recordOverall.ties"],
            Integer,
        ),
        FieldSpec::optional(
            "points_for",
            &["points_for", "settings.fpts", "record.overall.pointsFor", "pointsFor.value"],
            Number,
        ),
        FieldSpec::optional("rank", &["rank", "playoffSeed", "recordOverall.rank"], Integer),
        FieldSpec::optional("name", &["name", "team_name"], Text),
    ],
};

static MATCHUPS: RecordSchema = RecordSchema {
    fields: &[
        FieldSpec::required("matchup_id", &["matchup_id", "id"], Id),
        FieldSpec::optional("period", &["period", "matchupPeriodId", "week"], Integer),
        FieldSpec::optional("team_id", &["team_id", "roster_id", "home.teamId", "home.id"], Id),
        FieldSpec::optional(
            "points",
            &["points", "home.totalPoints", "homeScore.score.value"],
            Number,
        ),
        FieldSpec::optional("opponent_id", &["opponent_id", "away.teamId", "away.id"], Id),
        FieldSpec::optional(
            "opponent_points",
            &["opponent_points", "away.totalPoints", "awayScore.score.value"],
            Number,
        ),
    ],
};

static TRANSACTIONS: RecordSchema = RecordSchema {
    fields: &[
        FieldSpec::required("transaction_id", &["transaction_id", "id"], Id),
        FieldSpec::required("type", &["type"], Text),
        FieldSpec::optional("status", &["status"], Text),
        FieldSpec::optional("created", &["created", "proposedDate"], Integer),
        FieldSpec::optional("team_ids", &["team_ids", "roster_ids"], List),
    ],
};

static DRAFTS: RecordSchema = RecordSchema {
    fields: &[
        FieldSpec::required("draft_id", &["draft_id", "id"], Id),
        FieldSpec::optional("status", &["status"], Text),
        FieldSpec::optional("type", &["type"], Text),
        FieldSpec::optional("season", &["season", "seasonId"], Id),
        FieldSpec::optional("picks", &["picks", "draftDetail.picks"], List),
        FieldSpec::optional("rounds", &["rounds", "settings.rounds"], Integer),
        FieldSpec::optional("completed", &["completed", "draftDetail.drafted"], Bool),
    ],
};

static ANALYTICS: RecordSchema = RecordSchema {
    fields: &[
        FieldSpec::required("league_id", &["league_id", "id"], Id),
        FieldSpec::optional("season", &["season", "seasonId"], Integer),
        FieldSpec::required("teams", &["teams"], List),
        FieldSpec::optional("scoring_period", &["scoring_period", "scoringPeriodId"], Integer),
    ],
};

/// Record schema for a data type.
pub fn schema_for(data_type: DataType) -> &'static RecordSchema {
    match data_type {
        DataType::Standings => &STANDINGS,
        DataType::Matchups => &MATCHUPS,
        DataType::Transactions => &TRANSACTIONS,
        DataType::Drafts => &DRAFTS,
        DataType::Analytics => &ANALYTICS,
    }
}

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Log a warning when a record carried fields that were stripped.
    pub warn_on_stripped_fields: bool,
    /// Treat an empty sequence as a contract violation.
    pub reject_empty_sequences: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            warn_on_stripped_fields: false,
            reject_empty_sequences: false,
        }
    }
}

/// Validates and sanitizes provider payloads.
pub struct SchemaValidator {
    config: ValidatorConfig,
}

impl SchemaValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate `raw` against the contract for `data_type`.
    ///
    /// Returns the sanitized payload, or a [`IngestError::Validation`] listing
    /// every hard issue found.
    pub fn validate(&self, data_type: DataType, raw: &Value) -> Result<Value, IngestError> {
        let (sanitized, issues) = self.inspect(data_type, raw);

        let hard: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();
        if !hard.is_empty() {
            warn!("Rejecting {} payload: {}", data_type, hard.join("; "));
            return Err(IngestError::Validation {
                data_type,
                message: hard.join("; "),
            });
        }

        if self.config.warn_on_stripped_fields {
            for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
                warn!("{} payload: {}", data_type, issue.message);
            }
        }

        Ok(sanitized)
    }

    /// Sanitize `raw` and collect every issue, without failing.
    pub fn inspect(&self, data_type: DataType, raw: &Value) -> (Value, Vec<ValidationIssue>) {
        let schema = schema_for(data_type);
        let mut issues = Vec::new();

        let sanitized = match data_type.shape() {
            PayloadShape::Sequence => match raw {
                Value::Array(items) => {
                    if items.is_empty() && self.config.reject_empty_sequences {
                        issues.push(ValidationIssue::hard("expected at least one record"));
                    }
                    let records = items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            sanitize_record(schema, item, &format!("record {}: ", index), &mut issues)
                        })
                        .collect();
                    Value::Array(records)
                }
                other => {
                    issues.push(ValidationIssue::hard(format!(
                        "expected a sequence of records, got {}",
                        json_type(other)
                    )));
                    Value::Null
                }
            },
            PayloadShape::Record => sanitize_record(schema, raw, "", &mut issues),
        };

        (sanitized, issues)
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

fn sanitize_record(
    schema: &RecordSchema,
    raw: &Value,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Value {
    let Some(record) = raw.as_object() else {
        issues.push(ValidationIssue::hard(format!(
            "{}expected an object, got {}",
            prefix,
            json_type(raw)
        )));
        return Value::Null;
    };

    let mut out = Map::new();
    for field in schema.fields {
        match field.lookup(record) {
            None | Some((_, Value::Null)) if field.required => {
                issues.push(ValidationIssue::hard(format!(
                    "{}missing required field '{}'",
                    prefix, field.name
                )));
            }
            None | Some((_, Value::Null)) => {}
            Some((path, value)) => match field.kind.sanitize(value) {
                Some(clean) => {
                    out.insert(field.name.to_string(), clean);
                }
                None => issues.push(ValidationIssue::hard(format!(
                    "{}field '{}' (from '{}') must be {}, got {}",
                    prefix,
                    field.name,
                    path,
                    field.kind.describe(),
                    json_type(value)
                ))),
            },
        }
    }

    let stripped: Vec<&str> = record
        .keys()
        .filter(|key| !schema.consumes(key))
        .map(String::as_str)
        .collect();
    if !stripped.is_empty() {
        issues.push(ValidationIssue::soft(format!(
            "{}stripped unknown fields: {}",
            prefix,
            stripped.join(", ")
        )));
    }

    Value::Object(out)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
