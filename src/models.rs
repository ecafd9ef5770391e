// Core data structures for topicpulse signals

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Column used when a stored signal is analyzed without `metric_column_to_analyze`
pub const DEFAULT_METRIC_COLUMN: &str = "value";

/// A single timestamped observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimePoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A point whose value may be undefined (percent change over zero, decomposition edges)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionalPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Named series of points, sorted ascending by timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub signal_name: String,

    #[serde(default)]
    pub points: Vec<TimePoint>,

    /// Opaque pass-through metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TimeSeries {
    /// Create an empty series
    pub fn new(signal_name: impl Into<String>) -> Self {
        Self {
            signal_name: signal_name.into(),
            points: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a series from points (caller guarantees ascending timestamps)
    pub fn with_points(signal_name: impl Into<String>, points: Vec<TimePoint>) -> Self {
        Self {
            signal_name: signal_name.into(),
            points,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Values in timestamp order
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// First and last timestamp, if any
    #[must_use]
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

/// One sentiment label reported for a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentObservation {
    pub label: String,
    pub score: f64,
}

/// Keyword occurrence count in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFrequency {
    pub keyword: String,
    pub frequency: u64,
}

/// Per-document signals produced by the upstream NLP stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignal {
    #[serde(
        rename = "raw_mongo_id",
        alias = "raw_id",
        deserialize_with = "string_or_number"
    )]
    pub raw_id: String,

    #[serde(rename = "original_timestamp", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "overall_sentiment", alias = "sentiments", default)]
    pub sentiments: Vec<SentimentObservation>,

    #[serde(
        rename = "extracted_keywords_frequency",
        alias = "keyword_frequencies",
        default
    )]
    pub keyword_frequencies: Vec<KeywordFrequency>,
}

/// Aggregated signal sample for one topic over one timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAggregate {
    #[serde(deserialize_with = "string_or_number")]
    pub topic_id: String,
    pub topic_name: String,
    pub timeframe_start: DateTime<Utc>,
    pub timeframe_end: DateTime<Utc>,
    pub document_count: u64,

    /// Mean score per sentiment label among the documents reporting it
    #[serde(default)]
    pub sentiment_totals: BTreeMap<String, f64>,

    /// Summed frequency per keyword
    #[serde(default)]
    pub keyword_totals: BTreeMap<String, u64>,
}

impl TopicAggregate {
    /// Label with the highest mean score (ties broken by label order)
    #[must_use]
    pub fn dominant_sentiment(&self) -> Option<(&str, f64)> {
        self.sentiment_totals
            .iter()
            .fold(None, |best: Option<(&str, f64)>, (label, &score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((label.as_str(), score)),
            })
    }
}

/// Documents of one topic submitted for aggregation
///
/// A single aggregate over the timeframe keeps every document. When the
/// batch is split into buckets instead, `timeframe_start` and
/// `timeframe_end` (when present) select the documents that are bucketed
/// (`start <= timestamp < end`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub topic_id: String,
    pub topic_name: String,

    #[serde(default)]
    pub documents: Vec<DocumentSignal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe_start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe_end: Option<DateTime<Utc>>,
}

impl AggregationRequest {
    /// Whether a document falls inside the requested timeframe
    #[must_use]
    pub fn in_timeframe(&self, doc: &DocumentSignal) -> bool {
        self.timeframe_start.map_or(true, |start| doc.timestamp >= start)
            && self.timeframe_end.map_or(true, |end| doc.timestamp < end)
    }
}

/// One row of a stored signal that may multiplex several numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub columns: BTreeMap<String, f64>,
}

impl SignalRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            columns: BTreeMap::new(),
        }
    }

    /// Builder-style column insertion
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, value: f64) -> Self {
        self.columns.insert(name.into(), value);
        self
    }
}

/// Bucket width used when aggregating documents into signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAggregation {
    Hourly,
    Daily,
    Weekly,
}

impl TimeAggregation {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Width of one bucket
    #[must_use]
    pub fn bucket_width(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    /// Start of the bucket containing `ts` (weeks start Monday 00:00 UTC)
    #[must_use]
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        const HOUR: i64 = 3_600;
        const DAY: i64 = 86_400;

        let secs = ts.timestamp();
        let start = match self {
            Self::Hourly => secs - secs.rem_euclid(HOUR),
            Self::Daily => secs - secs.rem_euclid(DAY),
            Self::Weekly => {
                // 1970-01-01 was a Thursday, three days after a Monday
                let days = secs.div_euclid(DAY);
                let since_monday = (days + 3).rem_euclid(7);
                (days - since_monday) * DAY
            }
        };

        Utc.timestamp_opt(start, 0).single().unwrap_or(ts)
    }
}

impl fmt::Display for TimeAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!(
                "unsupported time aggregation '{other}' (expected hourly, daily or weekly)"
            )),
        }
    }
}

/// Identifiers arrive from upstream stores as either JSON strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(n) => n.to_string(),
        RawId::Float(n) => n.to_string(),
    })
}
