use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of league data a provider can serve.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Standings,
    Matchups,
    Transactions,
    Drafts,
    Analytics,
}

/// Top-level shape a validated payload must have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadShape {
    /// Ordered sequence of structured records.
    Sequence,
    /// A single structured record.
    Record,
}

impl DataType {
    /// Every data type, in ingestion order.
    pub const ALL: [DataType; 5] = [
        DataType::Standings,
        DataType::Matchups,
        DataType::Transactions,
        DataType::Drafts,
        DataType::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standings => "standings",
            Self::Matchups => "matchups",
            Self::Transactions => "transactions",
            Self::Drafts => "drafts",
            Self::Analytics => "analytics",
        }
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Standings | Self::Matchups | Self::Transactions => PayloadShape::Sequence,
            Self::Drafts | Self::Analytics => PayloadShape::Record,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standings" => Ok(Self::Standings),
            "matchups" => Ok(Self::Matchups),
            "transactions" => Ok(Self::Transactions),
            "drafts" => Ok(Self::Drafts),
            "analytics" => Ok(Self::Analytics),
            other => Err(format!("Unknown data type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Standings".parse::<DataType>(), Ok(DataType::Standings));
        assert_eq!(" drafts ".parse::<DataType>(), Ok(DataType::Drafts));
        assert!("boxscores".parse::<DataType>().is_err());
    }

    #[test]
    fn test_shapes() {
        assert_eq!(DataType::Matchups.shape(), PayloadShape::Sequence);
        assert_eq!(DataType::Analytics.shape(), PayloadShape::Record);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&DataType::Transactions).unwrap();
        assert_eq!(json, "\"transactions\"");
    }
}
