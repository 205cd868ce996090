use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Bucket resolution of a click chart, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("granularity must be 'minute', 'hour' or 'day', got '{0}'")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    // Tab indexes 0/1/2 are what the dashboard tabs send.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" | "0" => Ok(Granularity::Minute),
            "hour" | "hours" | "1" => Ok(Granularity::Hour),
            "day" | "days" | "2" => Ok(Granularity::Day),
            _ => Err(UnknownGranularity(value.to_string())),
        }
    }
}

/// A click instant as the backend serialized it, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Text(String),
    EpochMillis(i64),
    Other(serde_json::Value),
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketKey(pub String);

impl BucketKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub key: BucketKey,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub granularity: Granularity,
    pub records: Vec<BucketRecord>,
}

impl Series {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.records.iter().map(|record| record.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub subject: String,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Snapshot published by a `FetchOrchestrator` after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub request: Option<AggregationRequest>,
    pub phase: Phase,
    pub series: Series,
    /// Request whose fetch produced `series`; `None` while nothing has been fetched.
    pub series_request: Option<AggregationRequest>,
    pub is_loading: bool,
    pub error: Option<ErrorKind>,
    pub skipped: usize,
    pub generation: u64,
}

impl Default for StatsView {
    fn default() -> Self {
        Self {
            request: None,
            phase: Phase::Idle,
            series: Series::empty(Granularity::Minute),
            series_request: None,
            is_loading: false,
            error: None,
            skipped: 0,
            generation: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_parses_names_and_tab_indexes() {
        assert_eq!("Minute".parse::<Granularity>().unwrap(), Granularity::Minute);
        assert_eq!(" hours ".parse::<Granularity>().unwrap(), Granularity::Hour);
        assert_eq!("2".parse::<Granularity>().unwrap(), Granularity::Day);
        let err = "week".parse::<Granularity>().unwrap_err();
        assert_eq!(err.to_string(), "granularity must be 'minute', 'hour' or 'day', got 'week'");
    }

    #[test]
    fn granularity_is_ordered_by_coarseness() {
        assert!(Granularity::Minute < Granularity::Hour);
        assert!(Granularity::Hour < Granularity::Day);
    }

    #[test]
    fn raw_timestamps_accept_mixed_json() {
        let raw: Vec<RawTimestamp> =
            serde_json::from_str(r#"["2024-01-01T09:05:00Z", 1704099900000, null, true]"#).unwrap();
        assert_eq!(raw[0], RawTimestamp::Text("2024-01-01T09:05:00Z".into()));
        assert_eq!(raw[1], RawTimestamp::EpochMillis(1_704_099_900_000));
        assert_eq!(raw[2], RawTimestamp::Other(serde_json::Value::Null));
        assert_eq!(raw[3], RawTimestamp::Other(serde_json::Value::Bool(true)));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SourceUnavailable).unwrap();
        assert_eq!(json, "\"source_unavailable\"");
    }
}
