//! Common test utilities

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use topicpulse::models::{
    DocumentSignal, KeywordFrequency, SentimentObservation, TimePoint, TimeSeries, TopicAggregate,
};

/// Parse an RFC 3339 timestamp
pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Fixed start of every fixture series
pub fn base_time() -> DateTime<Utc> {
    ts("2024-05-01T00:00:00Z")
}

/// Hourly points starting at [`base_time`]
pub fn hourly_points(values: &[f64]) -> Vec<TimePoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| TimePoint::new(base_time() + Duration::hours(i as i64), *v))
        .collect()
}

/// Hourly series starting at [`base_time`]
pub fn hourly_series(name: &str, values: &[f64]) -> TimeSeries {
    TimeSeries::with_points(name, hourly_points(values))
}

/// Create a document with sentiments and keywords
pub fn document(
    raw_id: &str,
    timestamp: DateTime<Utc>,
    sentiments: &[(&str, f64)],
    keywords: &[(&str, u64)],
) -> DocumentSignal {
    DocumentSignal {
        raw_id: raw_id.to_string(),
        timestamp,
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

/// Create an hourly aggregate `hour` hours after [`base_time`]
pub fn aggregate(topic_id: &str, hour: i64, document_count: u64, sentiments: &[(&str, f64)]) -> TopicAggregate {
    let start = base_time() + Duration::hours(hour);
    TopicAggregate {
        topic_id: topic_id.to_string(),
        topic_name: format!("Topic {topic_id}"),
        timeframe_start: start,
        timeframe_end: start + Duration::hours(1),
        document_count,
        sentiment_totals: sentiments.iter().map(|(l, s)| (l.to_string(), *s)).collect(),
        keyword_totals: Default::default(),
    }
}

/// Assert two floats are within `tol`
pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tolerance {tol})"
    );
}
