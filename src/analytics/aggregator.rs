//! Signal aggregation from per-document observations
//!
//! Turns a batch of [`DocumentSignal`]s for one topic into a
//! [`TopicAggregate`]: mean sentiment per label among the documents that
//! report it, summed keyword frequencies, and a distinct document count.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::models::{
    AggregationRequest, DocumentSignal, SignalRecord, TimeAggregation, TopicAggregate, DEFAULT_METRIC_COLUMN,
};

use super::error::{AnalyticsError, AnalyticsResult};

/// Column holding the document count in materialized topic signals
pub const DOCUMENT_COUNT_COLUMN: &str = "document_count";

/// Prefix of per-label sentiment columns in materialized topic signals
pub const SENTIMENT_COLUMN_PREFIX: &str = "sentiment_";

/// Running sum/count for one sentiment label
#[derive(Debug, Default, Clone, Copy)]
struct LabelAccumulator {
    sum: f64,
    documents: u64,
}

/// Aggregate one batch of documents for a topic and timeframe `[start, end)`
///
/// Documents sharing a `raw_id` are counted once (first occurrence wins).
/// An empty batch yields a zero-count aggregate, not an error.
///
/// # Errors
///
/// Returns [`AnalyticsError::MalformedInput`] when `topic_id` is empty.
pub fn aggregate_topic(
    topic_id: &str,
    topic_name: &str,
    timeframe_start: DateTime<Utc>,
    timeframe_end: DateTime<Utc>,
    documents: &[DocumentSignal],
) -> AnalyticsResult<TopicAggregate> {
    if topic_id.trim().is_empty() {
        return Err(AnalyticsError::malformed("topic_id", "must not be empty"));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(documents.len());
    let mut labels: BTreeMap<String, LabelAccumulator> = BTreeMap::new();
    let mut keyword_totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut outside_timeframe = 0usize;

    for doc in documents {
        if !seen.insert(doc.raw_id.as_str()) {
            tracing::debug!(topic_id, raw_id = %doc.raw_id, "Skipping duplicate document");
            continue;
        }

        if doc.timestamp < timeframe_start || doc.timestamp >= timeframe_end {
            outside_timeframe += 1;
        }

        // A label reported several times by one document counts once, at its mean
        let mut per_doc: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
        for obs in &doc.sentiments {
            let entry = per_doc.entry(obs.label.as_str()).or_insert((0.0, 0));
            entry.0 += obs.score;
            entry.1 += 1;
        }
        for (label, (sum, n)) in per_doc {
            let acc = labels.entry(label.to_string()).or_default();
            acc.sum += sum / f64::from(n);
            acc.documents += 1;
        }

        for kw in &doc.keyword_frequencies {
            *keyword_totals.entry(kw.keyword.clone()).or_insert(0) += kw.frequency;
        }
    }

    if outside_timeframe > 0 {
        tracing::debug!(
            topic_id,
            outside_timeframe,
            "Documents outside the requested timeframe were included"
        );
    }

    let sentiment_totals = labels
        .into_iter()
        .map(|(label, acc)| (label, acc.sum / acc.documents as f64))
        .collect();

    Ok(TopicAggregate {
        topic_id: topic_id.to_string(),
        topic_name: topic_name.to_string(),
        timeframe_start,
        timeframe_end,
        document_count: seen.len() as u64,
        sentiment_totals,
        keyword_totals,
    })
}

/// Aggregate a request over its own timeframe
///
/// Every document of the request is kept, including those stamped outside
/// the timeframe.
///
/// # Errors
///
/// Returns [`AnalyticsError::MalformedInput`] when either timeframe bound is
/// missing or `topic_id` is empty.
pub fn aggregate_request(request: &AggregationRequest) -> AnalyticsResult<TopicAggregate> {
    let start = request
        .timeframe_start
        .ok_or_else(|| AnalyticsError::malformed("timeframe_start", "required for a single aggregate"))?;
    let end = request
        .timeframe_end
        .ok_or_else(|| AnalyticsError::malformed("timeframe_end", "required for a single aggregate"))?;

    aggregate_topic(&request.topic_id, &request.topic_name, start, end, &request.documents)
}

/// Split a batch into time buckets and aggregate each one
///
/// Buckets come back in ascending order; empty buckets are not produced.
pub fn aggregate_by_bucket(
    topic_id: &str,
    topic_name: &str,
    documents: &[DocumentSignal],
    aggregation: TimeAggregation,
) -> AnalyticsResult<Vec<TopicAggregate>> {
    if topic_id.trim().is_empty() {
        return Err(AnalyticsError::malformed("topic_id", "must not be empty"));
    }

    let mut buckets: BTreeMap<DateTime<Utc>, Vec<DocumentSignal>> = BTreeMap::new();
    for doc in documents {
        buckets
            .entry(aggregation.bucket_start(doc.timestamp))
            .or_default()
            .push(doc.clone());
    }

    buckets
        .into_iter()
        .map(|(start, docs)| {
            let end = start + aggregation.bucket_width();
            aggregate_topic(topic_id, topic_name, start, end, &docs)
        })
        .collect()
}

/// Name under which a topic's aggregates are stored as a signal, e.g. `topic_5_hourly`
pub fn topic_signal_name(topic_id: &str, aggregation: TimeAggregation) -> String {
    format!("topic_{topic_id}_{aggregation}")
}

/// Materialize an aggregate into one multi-column signal row
///
/// Columns: `document_count`, `value` (same as document count, the default
/// analysis column) and `sentiment_<label>` per reported label.
pub fn signal_record(aggregate: &TopicAggregate) -> SignalRecord {
    let count = aggregate.document_count as f64;
    let mut record = SignalRecord::new(aggregate.timeframe_start)
        .with_column(DOCUMENT_COUNT_COLUMN, count)
        .with_column(DEFAULT_METRIC_COLUMN, count);

    for (label, score) in &aggregate.sentiment_totals {
        record
            .columns
            .insert(format!("{SENTIMENT_COLUMN_PREFIX}{label}"), *score);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeywordFrequency, SentimentObservation};
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn doc(id: &str, at: &str, sentiments: &[(&str, f64)], keywords: &[(&str, u64)]) -> DocumentSignal {
        DocumentSignal {
            raw_id: id.to_string(),
            timestamp: ts(at),
            sentiments: sentiments
                .iter()
                .map(|(label, score)| SentimentObservation {
                    label: label.to_string(),
                    score: *score,
                })
                .collect(),
            keyword_frequencies: keywords
                .iter()
                .map(|(keyword, frequency)| KeywordFrequency {
                    keyword: keyword.to_string(),
                    frequency: *frequency,
                })
                .collect(),
        }
    }

    #[test]
    fn test_absent_label_is_not_zero() {
        let start = ts("2024-05-01T00:00:00Z");
        let docs = vec![
            doc("a", "2024-05-01T00:10:00Z", &[("Concerned", 0.8)], &[]),
            doc("b", "2024-05-01T00:20:00Z", &[("Concerned", 0.4), ("Satisfied", 0.9)], &[]),
            doc("c", "2024-05-01T00:30:00Z", &[], &[]),
        ];

        let agg = aggregate_topic("t1", "Vaccines", start, start + Duration::hours(1), &docs).unwrap();

        assert_eq!(agg.document_count, 3);
        assert!((agg.sentiment_totals["Concerned"] - 0.6).abs() < 1e-12);
        assert!((agg.sentiment_totals["Satisfied"] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_keywords_are_summed() {
        let start = ts("2024-05-01T00:00:00Z");
        let docs = vec![
            doc("a", "2024-05-01T00:10:00Z", &[], &[("clinic", 2), ("wait", 1)]),
            doc("b", "2024-05-01T00:20:00Z", &[], &[("clinic", 5)]),
        ];

        let agg = aggregate_topic("t1", "Clinics", start, start + Duration::hours(1), &docs).unwrap();
        assert_eq!(agg.keyword_totals["clinic"], 7);
        assert_eq!(agg.keyword_totals["wait"], 1);
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let start = ts("2024-05-01T00:00:00Z");
        let agg = aggregate_topic("t1", "Empty", start, start + Duration::hours(1), &[]).unwrap();

        assert_eq!(agg.document_count, 0);
        assert!(agg.sentiment_totals.is_empty());
        assert!(agg.keyword_totals.is_empty());
    }

    #[test]
    fn test_request_keeps_documents_outside_timeframe() {
        let start = ts("2024-05-01T00:00:00Z");
        let request = AggregationRequest {
            topic_id: "t1".to_string(),
            topic_name: "Late".to_string(),
            documents: vec![
                doc("a", "2024-05-01T00:10:00Z", &[("Angry", 0.2)], &[]),
                doc("b", "2024-05-01T01:00:01Z", &[("Angry", 0.6)], &[]),
            ],
            timeframe_start: Some(start),
            timeframe_end: Some(start + Duration::hours(1)),
        };

        let agg = aggregate_request(&request).unwrap();
        assert_eq!(agg.document_count, 2);
        assert!((agg.sentiment_totals["Angry"] - 0.4).abs() < 1e-12);
        assert_eq!(agg.timeframe_end, start + Duration::hours(1));
    }

    #[test]
    fn test_request_needs_timeframe() {
        let request = AggregationRequest {
            topic_id: "t1".to_string(),
            topic_name: "Open".to_string(),
            documents: Vec::new(),
            timeframe_start: None,
            timeframe_end: None,
        };

        let err = aggregate_request(&request).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedInput { ref field, .. } if field == "timeframe_start"));
    }

    #[test]
    fn test_duplicate_documents_counted_once() {
        let start = ts("2024-05-01T00:00:00Z");
        let docs = vec![
            doc("a", "2024-05-01T00:10:00Z", &[("Angry", 1.0)], &[("queue", 1)]),
            doc("a", "2024-05-01T00:10:00Z", &[("Angry", 0.0)], &[("queue", 1)]),
        ];

        let agg = aggregate_topic("t1", "Dup", start, start + Duration::hours(1), &docs).unwrap();
        assert_eq!(agg.document_count, 1);
        assert_eq!(agg.sentiment_totals["Angry"], 1.0);
        assert_eq!(agg.keyword_totals["queue"], 1);
    }

    #[test]
    fn test_repeated_label_within_document_counts_once() {
        let start = ts("2024-05-01T00:00:00Z");
        let docs = vec![
            doc("a", "2024-05-01T00:10:00Z", &[("Anxious", 0.2), ("Anxious", 0.6)], &[]),
            doc("b", "2024-05-01T00:20:00Z", &[("Anxious", 1.0)], &[]),
        ];

        let agg = aggregate_topic("t1", "Repeat", start, start + Duration::hours(1), &docs).unwrap();
        // doc a contributes 0.4, doc b contributes 1.0
        assert!((agg.sentiment_totals["Anxious"] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_missing_topic_id_is_malformed() {
        let start = ts("2024-05-01T00:00:00Z");
        let err = aggregate_topic(" ", "x", start, start, &[]).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedInput { .. }));
    }

    #[test]
    fn test_aggregate_by_bucket_hourly() {
        let docs = vec![
            doc("a", "2024-05-01T00:10:00Z", &[("Concerned", 0.5)], &[]),
            doc("b", "2024-05-01T01:20:00Z", &[("Concerned", 0.7)], &[]),
            doc("c", "2024-05-01T01:40:00Z", &[], &[]),
        ];

        let buckets = aggregate_by_bucket("t1", "Topic", &docs, TimeAggregation::Hourly).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].timeframe_start, ts("2024-05-01T00:00:00Z"));
        assert_eq!(buckets[0].timeframe_end, ts("2024-05-01T01:00:00Z"));
        assert_eq!(buckets[1].document_count, 2);
    }

    #[test]
    fn test_signal_record_columns() {
        let start = ts("2024-05-01T00:00:00Z");
        let docs = vec![doc("a", "2024-05-01T00:10:00Z", &[("Concerned", 0.5)], &[])];
        let agg = aggregate_topic("t1", "Topic", start, start + Duration::hours(1), &docs).unwrap();

        let record = signal_record(&agg);
        assert_eq!(record.timestamp, start);
        assert_eq!(record.columns[DOCUMENT_COUNT_COLUMN], 1.0);
        assert_eq!(record.columns[DEFAULT_METRIC_COLUMN], 1.0);
        assert_eq!(record.columns["sentiment_Concerned"], 0.5);
        assert_eq!(topic_signal_name("t1", TimeAggregation::Daily), "topic_t1_daily");
    }
}
