//! Read-only projections over stored topic aggregates
//!
//! These back the dashboard-style queries: system overview, active topic
//! list, per-topic volume trend, dominant-sentiment distribution, top
//! keywords, and per-label sentiment trends across all topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{TimePoint, TimeSeries, TopicAggregate};

use super::ranking::roll_up;

/// System-wide totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewStats {
    pub total_documents_processed: u64,
    pub active_topics_count: usize,
    pub last_data_ingested_at: Option<DateTime<Utc>>,
}

/// Topic with its volume in the queried window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTopic {
    pub topic_id: String,
    pub topic_name: String,
    pub total_documents_in_period: u64,
    pub last_seen: DateTime<Utc>,
}

/// Document volume per bucket for one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTrend {
    pub topic_id: String,
    pub topic_name: String,
    pub trend_data: Vec<TimePoint>,
}

impl TopicTrend {
    /// View the trend as an analyzable series named `topic_<id>_document_count`
    #[must_use]
    pub fn to_series(&self) -> TimeSeries {
        TimeSeries::with_points(
            format!("topic_{}_document_count", self.topic_id),
            self.trend_data.clone(),
        )
    }
}

/// Documents in buckets where `label` was the dominant sentiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSentiment {
    pub topic_id: String,
    pub topic_name: String,
    pub sentiments: Vec<SentimentCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordDetail {
    pub keyword: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeywords {
    pub topic_id: String,
    pub topic_name: String,
    pub keywords: Vec<KeywordDetail>,
}

/// Mean score of one label across topics, per bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTrend {
    pub sentiment_label: String,
    pub trend_data: Vec<TimePoint>,
}

/// Total documents, distinct topics, and the newest bucket seen
#[must_use]
pub fn overview(aggregates: &[TopicAggregate]) -> OverviewStats {
    let topics: std::collections::BTreeSet<&str> =
        aggregates.iter().map(|a| a.topic_id.as_str()).collect();

    OverviewStats {
        total_documents_processed: aggregates.iter().map(|a| a.document_count).sum(),
        active_topics_count: topics.len(),
        last_data_ingested_at: aggregates.iter().map(|a| a.timeframe_start).max(),
    }
}

/// Topics with at least `min_doc_count` documents, busiest first
#[must_use]
pub fn active_topics(aggregates: &[TopicAggregate], min_doc_count: u64, limit: usize) -> Vec<ActiveTopic> {
    let mut topics: Vec<ActiveTopic> = roll_up(aggregates)
        .into_iter()
        .filter(|t| t.document_count >= min_doc_count)
        .map(|t| ActiveTopic {
            topic_id: t.topic_id,
            topic_name: t.topic_name,
            total_documents_in_period: t.document_count,
            last_seen: t.last_seen,
        })
        .collect();

    topics.sort_by(|a, b| {
        b.total_documents_in_period
            .cmp(&a.total_documents_in_period)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    topics.truncate(limit);
    topics
}

fn topic_buckets<'a>(aggregates: &'a [TopicAggregate], topic_id: &str) -> Vec<&'a TopicAggregate> {
    let mut buckets: Vec<&TopicAggregate> = aggregates.iter().filter(|a| a.topic_id == topic_id).collect();
    buckets.sort_by_key(|a| a.timeframe_start);
    buckets
}

fn latest_name(buckets: &[&TopicAggregate], topic_id: &str) -> String {
    buckets
        .last()
        .map(|a| a.topic_name.clone())
        .unwrap_or_else(|| format!("Topic {topic_id}"))
}

/// Document count per bucket; `None` when the topic has no data
#[must_use]
pub fn topic_trend(aggregates: &[TopicAggregate], topic_id: &str) -> Option<TopicTrend> {
    let buckets = topic_buckets(aggregates, topic_id);
    if buckets.is_empty() {
        return None;
    }

    Some(TopicTrend {
        topic_id: topic_id.to_string(),
        topic_name: latest_name(&buckets, topic_id),
        trend_data: buckets
            .iter()
            .map(|a| TimePoint::new(a.timeframe_start, a.document_count as f64))
            .collect(),
    })
}

/// Dominant label per bucket, weighted by the bucket's document count
#[must_use]
pub fn sentiment_distribution(aggregates: &[TopicAggregate], topic_id: &str) -> TopicSentiment {
    let buckets = topic_buckets(aggregates, topic_id);

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for bucket in &buckets {
        if let Some((label, _)) = bucket.dominant_sentiment() {
            *counts.entry(label.to_string()).or_insert(0) += bucket.document_count;
        }
    }

    let mut sentiments: Vec<SentimentCount> = counts
        .into_iter()
        .map(|(label, count)| SentimentCount { label, count })
        .collect();
    sentiments.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    TopicSentiment {
        topic_id: topic_id.to_string(),
        topic_name: latest_name(&buckets, topic_id),
        sentiments,
    }
}

/// Keyword frequencies summed over the window, most frequent first
#[must_use]
pub fn top_keywords(aggregates: &[TopicAggregate], topic_id: &str, limit: usize) -> TopicKeywords {
    let buckets = topic_buckets(aggregates, topic_id);

    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for bucket in &buckets {
        for (keyword, freq) in &bucket.keyword_totals {
            *totals.entry(keyword.as_str()).or_insert(0) += freq;
        }
    }

    let mut keywords: Vec<KeywordDetail> = totals
        .into_iter()
        .map(|(keyword, frequency)| KeywordDetail {
            keyword: keyword.to_string(),
            frequency,
        })
        .collect();
    keywords.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.keyword.cmp(&b.keyword)));
    keywords.truncate(limit);

    TopicKeywords {
        topic_id: topic_id.to_string(),
        topic_name: latest_name(&buckets, topic_id),
        keywords,
    }
}

/// Per label, the mean across reporting topics at each bucket start
///
/// Every requested label gets an entry, possibly with an empty trend.
#[must_use]
pub fn overall_sentiment_trend(aggregates: &[TopicAggregate], labels: &[String]) -> Vec<LabelTrend> {
    labels
        .iter()
        .map(|label| {
            let mut per_bucket: BTreeMap<DateTime<Utc>, (f64, u32)> = BTreeMap::new();
            for agg in aggregates {
                if let Some(score) = agg.sentiment_totals.get(label) {
                    let entry = per_bucket.entry(agg.timeframe_start).or_insert((0.0, 0));
                    entry.0 += score;
                    entry.1 += 1;
                }
            }

            LabelTrend {
                sentiment_label: label.clone(),
                trend_data: per_bucket
                    .into_iter()
                    .map(|(ts, (sum, n))| TimePoint::new(ts, sum / f64::from(n)))
                    .collect(),
            }
        })
        .collect()
}
