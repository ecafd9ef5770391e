//! Signal storage abstraction
//!
//! The analytics engine never talks to a database directly. Stored signals
//! and topic aggregates are read through the [`SignalSource`] trait:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        analysis::execute / service api       │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │                 SignalSource                 │
//! │   fetch_records, fetch_series, aggregates    │
//! └──────────────────────────────────────────────┘
//!                        │
//!           ┌────────────┴────────────┐
//!           ▼                         ▼
//! ┌──────────────────┐      ┌──────────────────┐
//! │ MemorySignalStore│      │ external backend │
//! └──────────────────┘      └──────────────────┘
//! ```
//!
//! All time ranges are inclusive on both ends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::analytics::aggregator::{signal_record, topic_signal_name};
use crate::analytics::analysis::select_metric;
use crate::analytics::error::AnalyticsResult;
use crate::models::{SignalRecord, TimeAggregation, TimeSeries, TopicAggregate, DEFAULT_METRIC_COLUMN};

/// Read access to stored signals
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Rows of a stored signal with `start <= timestamp <= end`, ascending
    async fn fetch_records(
        &self,
        signal_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<SignalRecord>>;

    /// Topic aggregates of one level with `start <= timeframe_start <= end`
    async fn fetch_aggregates(
        &self,
        aggregation: TimeAggregation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<TopicAggregate>>;

    /// One column of a stored signal as a series (`value` when `metric` is `None`)
    async fn fetch_series(
        &self,
        signal_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        metric: Option<&str>,
    ) -> AnalyticsResult<TimeSeries> {
        let records = self.fetch_records(signal_name, start, end).await?;
        select_metric(signal_name, &records, metric)
    }
}

/// In-process signal store
///
/// Rows are keyed by timestamp per signal; aggregates by
/// `(topic_id, timeframe_start)` per aggregation level. Writes upsert.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    records: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, SignalRecord>>>,
    aggregates: RwLock<HashMap<TimeAggregation, BTreeMap<(String, DateTime<Utc>), TopicAggregate>>>,
}

impl MemorySignalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a single-column series under the default `value` column
    pub async fn insert_series(&self, series: &TimeSeries) {
        let records = series
            .points
            .iter()
            .map(|p| SignalRecord::new(p.timestamp).with_column(DEFAULT_METRIC_COLUMN, p.value))
            .collect();
        self.insert_records(&series.signal_name, records).await;
    }

    /// Store rows, merging columns into rows that share a timestamp
    pub async fn insert_records(&self, signal_name: &str, records: Vec<SignalRecord>) {
        let mut guard = self.records.write().await;
        let rows = guard.entry(signal_name.to_string()).or_default();

        for record in records {
            rows.entry(record.timestamp)
                .and_modify(|existing| existing.columns.extend(record.columns.clone()))
                .or_insert(record);
        }
    }

    /// Store an aggregate and materialize it as a row of `topic_<id>_<level>`
    ///
    /// An aggregate for an existing `(topic_id, timeframe_start)` replaces the
    /// stored one and its row; batches are not merged. Both maps are updated
    /// under one critical section, so a reader never sees an aggregate
    /// without its row.
    pub async fn insert_aggregate(&self, aggregation: TimeAggregation, aggregate: TopicAggregate) {
        let signal_name = topic_signal_name(&aggregate.topic_id, aggregation);
        let record = signal_record(&aggregate);

        // Lock order: aggregates, then records
        let mut aggregates = self.aggregates.write().await;
        let mut records = self.records.write().await;

        aggregates.entry(aggregation).or_default().insert(
            (aggregate.topic_id.clone(), aggregate.timeframe_start),
            aggregate,
        );
        // Replace rather than merge: labels may disappear from a recomputed bucket
        records
            .entry(signal_name)
            .or_default()
            .insert(record.timestamp, record);
    }

    /// Names of all stored signals, sorted
    pub async fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of stored aggregates at one level
    pub async fn aggregate_count(&self, aggregation: TimeAggregation) -> usize {
        self.aggregates
            .read()
            .await
            .get(&aggregation)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl SignalSource for MemorySignalStore {
    async fn fetch_records(
        &self,
        signal_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<SignalRecord>> {
        if start > end {
            return Ok(Vec::new());
        }

        let guard = self.records.read().await;
        Ok(guard
            .get(signal_name)
            .map(|rows| rows.range(start..=end).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_aggregates(
        &self,
        aggregation: TimeAggregation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<TopicAggregate>> {
        let guard = self.aggregates.read().await;
        let mut found: Vec<TopicAggregate> = guard
            .get(&aggregation)
            .map(|level| {
                level
                    .values()
                    .filter(|a| a.timeframe_start >= start && a.timeframe_start <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        found.sort_by(|a, b| {
            a.timeframe_start
                .cmp(&b.timeframe_start)
                .then_with(|| a.topic_id.cmp(&b.topic_id))
        });
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::error::AnalyticsError;
    use crate::models::TimePoint;
    use chrono::Duration;
    use std::sync::Arc;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn aggregate(topic_id: &str, start: DateTime<Utc>, docs: u64) -> TopicAggregate {
        let mut sentiment_totals = BTreeMap::new();
        sentiment_totals.insert("Concerned".to_string(), 0.5);
        TopicAggregate {
            topic_id: topic_id.to_string(),
            topic_name: format!("Topic {topic_id}"),
            timeframe_start: start,
            timeframe_end: start + Duration::hours(1),
            document_count: docs,
            sentiment_totals,
            keyword_totals: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_series_round_trip_inclusive_range() {
        let store = MemorySignalStore::new();
        let start = ts("2024-05-01T00:00:00Z");
        let series = TimeSeries::with_points(
            "mentions",
            (0..5)
                .map(|i| TimePoint::new(start + Duration::hours(i), i as f64))
                .collect(),
        );
        store.insert_series(&series).await;

        let fetched = store
            .fetch_series("mentions", start + Duration::hours(1), start + Duration::hours(3), None)
            .await
            .unwrap();
        assert_eq!(fetched.values(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_unknown_signal_is_empty() {
        let store = MemorySignalStore::new();
        let start = ts("2024-05-01T00:00:00Z");
        let series = store
            .fetch_series("missing", start, start + Duration::days(1), Some("anything"))
            .await
            .unwrap();
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_insert_aggregate_materializes_columns() {
        let store = MemorySignalStore::new();
        let start = ts("2024-05-01T00:00:00Z");
        store
            .insert_aggregate(TimeAggregation::Hourly, aggregate("5", start, 12))
            .await;

        assert_eq!(store.signal_names().await, vec!["topic_5_hourly"]);

        let series = store
            .fetch_series("topic_5_hourly", start, start, Some("sentiment_Concerned"))
            .await
            .unwrap();
        assert_eq!(series.values(), vec![0.5]);

        let err = store
            .fetch_series("topic_5_hourly", start, start, Some("sentiment_Angry"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownMetricColumn { .. }));
    }

    #[tokio::test]
    async fn test_aggregate_upsert_and_range() {
        let store = MemorySignalStore::new();
        let start = ts("2024-05-01T00:00:00Z");

        store.insert_aggregate(TimeAggregation::Hourly, aggregate("1", start, 3)).await;
        store.insert_aggregate(TimeAggregation::Hourly, aggregate("1", start, 7)).await;
        store
            .insert_aggregate(TimeAggregation::Hourly, aggregate("2", start + Duration::hours(2), 1))
            .await;
        store.insert_aggregate(TimeAggregation::Daily, aggregate("1", start, 10)).await;

        assert_eq!(store.aggregate_count(TimeAggregation::Hourly).await, 2);

        let hourly = store
            .fetch_aggregates(TimeAggregation::Hourly, start, start + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].document_count, 7);
    }

    #[tokio::test]
    async fn test_second_batch_replaces_bucket() {
        let store = MemorySignalStore::new();
        let start = ts("2024-05-01T00:00:00Z");

        store.insert_aggregate(TimeAggregation::Hourly, aggregate("3", start, 4)).await;

        let mut recomputed = aggregate("3", start, 2);
        recomputed.sentiment_totals.clear();
        recomputed.sentiment_totals.insert("Angry".to_string(), 0.9);
        store.insert_aggregate(TimeAggregation::Hourly, recomputed).await;

        let stored = store
            .fetch_aggregates(TimeAggregation::Hourly, start, start)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].document_count, 2);
        assert!(!stored[0].sentiment_totals.contains_key("Concerned"));

        let rows = store.fetch_records("topic_3_hourly", start, start).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns["document_count"], 2.0);
        assert!(!rows[0].columns.contains_key("sentiment_Concerned"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_visible_aggregate_always_has_row() {
        let store = Arc::new(MemorySignalStore::new());
        let start = ts("2024-05-01T00:00:00Z");

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for hour in 0..200 {
                    store
                        .insert_aggregate(TimeAggregation::Hourly, aggregate("9", start + Duration::hours(hour), 1))
                        .await;
                }
            })
        };

        let end = start + Duration::hours(200);
        loop {
            let aggregates = store.fetch_aggregates(TimeAggregation::Hourly, start, end).await.unwrap();
            let rows = store.fetch_records("topic_9_hourly", start, end).await.unwrap();
            assert!(rows.len() >= aggregates.len());
            if aggregates.len() == 200 {
                break;
            }
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
    }
}
