//! Topic ranking
//!
//! Rolls per-bucket [`TopicAggregate`]s up to one summary per topic and
//! orders topics by a selectable strategy:
//! - `high_concern_score`: concern sentiment weighted by relative volume
//! - `recent_volume`: documents in the window
//! - `volume_increase_abs`: documents gained over the preceding window
//!
//! Ranking never mutates its input and never fails on empty input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::TopicAggregate;

use super::error::AnalyticsError;

/// Labels treated as concern-bearing when none are configured
pub const DEFAULT_CONCERN_LABELS: [&str; 3] = ["Concerned", "Anxious", "Angry"];

/// Ranking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankStrategy {
    HighConcernScore,
    #[default]
    RecentVolume,
    VolumeIncreaseAbs,
}

impl RankStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighConcernScore => "high_concern_score",
            Self::RecentVolume => "recent_volume",
            Self::VolumeIncreaseAbs => "volume_increase_abs",
        }
    }

    /// Whether the strategy compares against the preceding window
    #[must_use]
    pub fn needs_previous_window(&self) -> bool {
        matches!(self, Self::VolumeIncreaseAbs)
    }
}

impl fmt::Display for RankStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankStrategy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high_concern_score" => Ok(Self::HighConcernScore),
            "recent_volume" => Ok(Self::RecentVolume),
            "volume_increase_abs" => Ok(Self::VolumeIncreaseAbs),
            other => Err(AnalyticsError::invalid_parameter(
                "rank_by",
                format!(
                    "unknown ranking strategy '{other}' (supported: high_concern_score, recent_volume, volume_increase_abs)"
                ),
            )),
        }
    }
}

/// One ranked topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRankEntry {
    #[serde(rename = "id", alias = "topic_id")]
    pub topic_id: String,

    #[serde(rename = "name", alias = "topic_name")]
    pub topic_name: String,

    pub score: f64,

    pub document_count: u64,

    #[serde(rename = "details", alias = "supporting_details", default)]
    pub supporting_details: Option<BTreeMap<String, Value>>,
}

/// Aggregates of one topic combined across buckets
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRollup {
    pub topic_id: String,
    /// Name from the most recent bucket
    pub topic_name: String,
    pub document_count: u64,
    /// Document-weighted mean per label across buckets
    pub sentiment_means: BTreeMap<String, f64>,
    pub keyword_totals: BTreeMap<String, u64>,
    pub last_seen: DateTime<Utc>,
}

/// Combine aggregates per topic, ordered by topic id
#[must_use]
pub fn roll_up(aggregates: &[TopicAggregate]) -> Vec<TopicRollup> {
    struct Acc<'a> {
        latest: &'a TopicAggregate,
        document_count: u64,
        weighted: BTreeMap<&'a str, (f64, f64)>,
        keywords: BTreeMap<&'a str, u64>,
    }

    let mut topics: BTreeMap<&str, Acc<'_>> = BTreeMap::new();

    for agg in aggregates {
        let acc = topics.entry(agg.topic_id.as_str()).or_insert_with(|| Acc {
            latest: agg,
            document_count: 0,
            weighted: BTreeMap::new(),
            keywords: BTreeMap::new(),
        });

        if agg.timeframe_start >= acc.latest.timeframe_start {
            acc.latest = agg;
        }
        acc.document_count += agg.document_count;

        let weight = agg.document_count as f64;
        for (label, mean) in &agg.sentiment_totals {
            let entry = acc.weighted.entry(label.as_str()).or_insert((0.0, 0.0));
            entry.0 += mean * weight;
            entry.1 += weight;
        }
        for (keyword, freq) in &agg.keyword_totals {
            *acc.keywords.entry(keyword.as_str()).or_insert(0) += freq;
        }
    }

    topics
        .into_iter()
        .map(|(topic_id, acc)| TopicRollup {
            topic_id: topic_id.to_string(),
            topic_name: acc.latest.topic_name.clone(),
            document_count: acc.document_count,
            sentiment_means: acc
                .weighted
                .into_iter()
                .filter(|(_, (_, weight))| *weight > 0.0)
                .map(|(label, (sum, weight))| (label.to_string(), sum / weight))
                .collect(),
            keyword_totals: acc
                .keywords
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            last_seen: acc.latest.timeframe_start,
        })
        .collect()
}

/// Mean of the concern labels a topic reports; 0 when it reports none
#[must_use]
pub fn concern_mean(sentiment_means: &BTreeMap<String, f64>, concern_labels: &[String]) -> f64 {
    let reported: Vec<f64> = concern_labels
        .iter()
        .filter_map(|label| sentiment_means.get(label).copied())
        .collect();

    if reported.is_empty() {
        0.0
    } else {
        reported.iter().sum::<f64>() / reported.len() as f64
    }
}

/// Relative volume in `[0, 1]` on a log scale
#[must_use]
pub fn volume_factor(document_count: u64, max_document_count: u64) -> f64 {
    if max_document_count == 0 {
        return 0.0;
    }
    ((document_count as f64).ln_1p() / (max_document_count as f64).ln_1p()).clamp(0.0, 1.0)
}

/// Concern score in `[0, 1]`
///
/// `concern_mean × ln(1 + docs) / ln(1 + max_docs)`. Non-decreasing in both
/// the concern mean and the document count.
#[must_use]
pub fn concern_score(concern_mean: f64, document_count: u64, max_document_count: u64) -> f64 {
    let score = concern_mean * volume_factor(document_count, max_document_count);
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Rank topics present in `current`
///
/// # Arguments
///
/// * `current` - Aggregates inside the ranking window
/// * `previous` - Aggregates of the equally long window before it (only read
///   by `volume_increase_abs`)
/// * `strategy` - Scoring strategy
/// * `limit` - Maximum entries returned
/// * `concern_labels` - Labels averaged by `high_concern_score`
#[must_use]
pub fn rank_topics(
    current: &[TopicAggregate],
    previous: &[TopicAggregate],
    strategy: RankStrategy,
    limit: usize,
    concern_labels: &[String],
) -> Vec<TopicRankEntry> {
    let topics = roll_up(current);
    let max_docs = topics.iter().map(|t| t.document_count).max().unwrap_or(0);

    let previous_volume: BTreeMap<String, u64> = if strategy.needs_previous_window() {
        roll_up(previous)
            .into_iter()
            .map(|t| (t.topic_id, t.document_count))
            .collect()
    } else {
        BTreeMap::new()
    };

    let mut entries: Vec<TopicRankEntry> = topics
        .into_iter()
        .map(|topic| {
            let (score, details) = match strategy {
                RankStrategy::HighConcernScore => {
                    let mean = concern_mean(&topic.sentiment_means, concern_labels);
                    let factor = volume_factor(topic.document_count, max_docs);
                    let mut details = BTreeMap::new();
                    details.insert("concern_mean".to_string(), Value::from(mean));
                    details.insert("volume_factor".to_string(), Value::from(factor));
                    (concern_score(mean, topic.document_count, max_docs), Some(details))
                }
                RankStrategy::RecentVolume => (topic.document_count as f64, None),
                RankStrategy::VolumeIncreaseAbs => {
                    let before = previous_volume.get(&topic.topic_id).copied().unwrap_or(0);
                    let mut details = BTreeMap::new();
                    details.insert("current_volume".to_string(), Value::from(topic.document_count));
                    details.insert("previous_volume".to_string(), Value::from(before));
                    (topic.document_count as f64 - before as f64, Some(details))
                }
            };

            TopicRankEntry {
                topic_id: topic.topic_id,
                topic_name: topic.topic_name,
                score,
                document_count: topic.document_count,
                supporting_details: details,
            }
        })
        .collect();

    entries.sort_by(compare_entries);
    entries.truncate(limit);

    tracing::debug!(
        strategy = %strategy,
        ranked = entries.len(),
        "Ranked topics"
    );

    entries
}

/// Score desc, then document count desc, then topic id asc
fn compare_entries(a: &TopicRankEntry, b: &TopicRankEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.document_count.cmp(&a.document_count))
        .then_with(|| a.topic_id.cmp(&b.topic_id))
}
