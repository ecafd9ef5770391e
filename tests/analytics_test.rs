//! End-to-end scenarios for the analytics engine

mod common;

use chrono::Duration;
use serde_json::{json, Map, Value};

use common::{aggregate, assert_close, base_time, document, hourly_points, hourly_series, ts};
use topicpulse::analytics::{
    aggregate_by_bucket, aggregate_topic, analyze, basic_stats, decompose, execute, moving_average,
    percent_change, rank_topics, AnalysisDefaults, AnalysisParams, AnalysisRequest, AnalysisResult,
    AnalysisType, AnalyticsError, DecompositionQuality, MovingAverageKind, RankStrategy,
    DEFAULT_CONCERN_LABELS,
};
use topicpulse::models::TimeAggregation;
use topicpulse::storage::{MemorySignalStore, SignalSource};

fn concern_labels() -> Vec<String> {
    DEFAULT_CONCERN_LABELS.iter().map(|s| s.to_string()).collect()
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// Time-series operations
// ============================================================================

#[test]
fn test_basic_stats_scenario() {
    let stats = basic_stats(&hourly_points(&[20.0, 22.5, 21.0, 23.0, 20.5]));

    assert_eq!(stats.count, 5);
    assert_close(stats.mean.unwrap(), 21.4, 1e-9);
    assert_eq!(stats.min, Some(20.0));
    assert_eq!(stats.max, Some(23.0));
    assert_eq!(stats.median, Some(21.0));
}

#[test]
fn test_basic_stats_empty_series() {
    let stats = basic_stats(&[]);
    assert_eq!(stats.count, 0);
    assert!(stats.mean.is_none());
    assert!(stats.std_dev.is_none());
}

#[test]
fn test_moving_average_scenario() {
    let points = hourly_points(&[15.0, 18.0, 12.0, 20.0, 22.0, 17.0, 19.0]);
    let ma = moving_average(&points, 3, MovingAverageKind::Simple);

    assert_eq!(ma.len(), 5);
    assert_eq!(ma[0].timestamp, points[2].timestamp);
    assert_close(ma[0].value, 15.0, 1e-12);
    assert_close(ma[4].value, (22.0 + 17.0 + 19.0) / 3.0, 1e-12);
}

#[test]
fn test_percent_change_over_zero_is_null() {
    let changes = percent_change(&hourly_points(&[0.0, 5.0, 10.0]));

    assert_eq!(changes.len(), 2);
    assert!(changes[0].value.is_none());
    assert_close(changes[1].value.unwrap(), 100.0, 1e-12);
}

#[test]
fn test_seasonal_pattern_decomposes_cleanly() {
    let pattern = [1.0, 3.0, 1.0, -1.0];
    let values: Vec<f64> = pattern.iter().cycle().take(16).copied().collect();
    let points = hourly_points(&values);

    let result = decompose(&points, 4).unwrap();
    assert_eq!(result.quality, DecompositionQuality::Full);
    assert_eq!(result.period_used, 4);

    assert!(result.trend[0].value.is_none());
    assert!(result.trend[15].value.is_none());

    for i in 2..14 {
        let trend = result.trend[i].value.unwrap();
        let seasonal = result.seasonal[i].value.unwrap();
        let residual = result.residual[i].value.unwrap();

        assert_close(trend, 1.0, 1e-9);
        assert_close(residual, 0.0, 1e-9);
        assert_close(trend + seasonal + residual, values[i], 1e-9);
    }
}

// ============================================================================
// Analysis dispatch
// ============================================================================

#[test]
fn test_analyze_z_score_constant_series() {
    let series = hourly_series("flat", &[4.0; 6]);
    let output = analyze(&series, AnalysisType::ZScore, &AnalysisParams::default()).unwrap();

    match output.result {
        AnalysisResult::ZScore { points, window } => {
            assert!(window.is_none());
            assert!(points.iter().all(|p| p.z_score == Some(0.0)));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_analysis_output_serializes_with_tag() {
    let series = hourly_series("signal", &[1.0, 2.0, 4.0]);
    let p = AnalysisParams {
        window: Some(2),
        moving_average_kind: Some(MovingAverageKind::Weighted),
        ..Default::default()
    };

    let output = analyze(&series, AnalysisType::MovingAverage, &p).unwrap();
    let json = serde_json::to_value(&output).unwrap();

    assert_eq!(json["analysis_type"], "moving_average");
    assert_eq!(json["type"], "weighted");
    assert_eq!(json["window"], 2);
    assert_eq!(json["signal_name"], "signal");
    assert_eq!(json["points"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_inline_request_ignores_store() {
    let store = MemorySignalStore::new();
    let request: AnalysisRequest = serde_json::from_value(json!({
        "time_series_data": {
            "signal_name": "inline",
            "points": [
                {"timestamp": "2024-05-01T00:00:00Z", "value": 1.0},
                {"timestamp": "2024-05-01T01:00:00Z", "value": 3.0}
            ],
            "metadata": {"origin": "test"}
        },
        "analysis_type": "rate_of_change",
        "parameters": {}
    }))
    .unwrap();

    let output = execute(&request, &store, &AnalysisDefaults::default()).await.unwrap();
    assert_eq!(output.signal_name, "inline");
    assert_eq!(output.metadata["origin"], "test");

    match output.result {
        AnalysisResult::RateOfChange { points } => {
            assert_eq!(points.len(), 1);
            assert_close(points[0].value, 2.0, 1e-12);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_analysis_type_rejected() {
    let store = MemorySignalStore::new();
    let request: AnalysisRequest = serde_json::from_value(json!({
        "time_series_data": {"signal_name": "s", "points": []},
        "analysis_type": "fourier_transform"
    }))
    .unwrap();

    let err = execute(&request, &store, &AnalysisDefaults::default()).await.unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidParameter { ref name, .. } if name == "analysis_type"));
}

// ============================================================================
// Aggregation and storage
// ============================================================================

#[test]
fn test_aggregation_dedup_and_label_means() {
    let at = base_time() + Duration::minutes(10);
    let docs = vec![
        document("a", at, &[("Concerned", 0.8)], &[("vaccine", 2)]),
        document("b", at, &[("Concerned", 0.4), ("Satisfied", 0.9)], &[("vaccine", 1), ("clinic", 4)]),
        // Duplicate id: ignored entirely
        document("a", at, &[("Concerned", 0.0)], &[("vaccine", 100)]),
    ];

    let agg = aggregate_topic("t1", "Vaccines", base_time(), base_time() + Duration::hours(1), &docs).unwrap();

    assert_eq!(agg.document_count, 2);
    assert_close(agg.sentiment_totals["Concerned"], 0.6, 1e-12);
    assert_close(agg.sentiment_totals["Satisfied"], 0.9, 1e-12);
    assert_eq!(agg.keyword_totals["vaccine"], 3);
    assert_eq!(agg.keyword_totals["clinic"], 4);
}

#[test]
fn test_empty_topic_id_is_malformed() {
    let err = aggregate_topic(" ", "x", base_time(), base_time() + Duration::hours(1), &[]).unwrap_err();
    assert!(matches!(err, AnalyticsError::MalformedInput { .. }));
}

#[tokio::test]
async fn test_fetch_then_analyze_stored_topic_signal() {
    let docs = vec![
        document("1", ts("2024-05-01T00:05:00Z"), &[("Concerned", 0.2)], &[]),
        document("2", ts("2024-05-01T00:45:00Z"), &[("Concerned", 0.4)], &[]),
        document("3", ts("2024-05-01T01:15:00Z"), &[("Concerned", 0.9)], &[]),
        document("4", ts("2024-05-01T02:30:00Z"), &[("Angry", 0.5)], &[]),
    ];
    let buckets = aggregate_by_bucket("t1", "Vaccines", &docs, TimeAggregation::Hourly).unwrap();
    assert_eq!(buckets.len(), 3);

    let store = MemorySignalStore::new();
    for bucket in buckets {
        store.insert_aggregate(TimeAggregation::Hourly, bucket).await;
    }

    let request = AnalysisRequest {
        time_series_data: None,
        signal_name: Some("topic_t1_hourly".to_string()),
        start_time: Some(base_time()),
        end_time: Some(base_time() + Duration::hours(6)),
        analysis_type: "basic_stats".to_string(),
        parameters: params(json!({"metric_column_to_analyze": "sentiment_Concerned"})),
        metric_column_to_analyze: None,
    };

    let output = execute(&request, &store, &AnalysisDefaults::default()).await.unwrap();
    match output.result {
        AnalysisResult::BasicStats(stats) => {
            // Hour 2 reports no Concerned label and is skipped
            assert_eq!(stats.count, 2);
            assert_close(stats.mean.unwrap(), (0.3 + 0.9) / 2.0, 1e-12);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // Default column is the document count
    let volume = store
        .fetch_series("topic_t1_hourly", base_time(), base_time() + Duration::hours(6), None)
        .await
        .unwrap();
    assert_eq!(volume.values(), vec![2.0, 1.0, 1.0]);
}

#[tokio::test]
async fn test_unknown_metric_column_lists_available() {
    let store = MemorySignalStore::new();
    store
        .insert_aggregate(TimeAggregation::Hourly, aggregate("t9", 0, 3, &[("Angry", 0.7)]))
        .await;

    let err = store
        .fetch_series("topic_t9_hourly", base_time(), base_time() + Duration::hours(1), Some("anger"))
        .await
        .unwrap_err();

    match err {
        AnalyticsError::UnknownMetricColumn { available, .. } => {
            assert_eq!(available, vec!["document_count", "sentiment_Angry", "value"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Ranking
// ============================================================================

#[test]
fn test_equal_volume_ranks_higher_concern_first() {
    let current = vec![
        aggregate("calm", 0, 10, &[("Concerned", 0.3)]),
        aggregate("worried", 0, 10, &[("Concerned", 0.8)]),
    ];

    let ranked = rank_topics(&current, &[], RankStrategy::HighConcernScore, 10, &concern_labels());

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].topic_id, "worried");
    assert_close(ranked[0].score, 0.8, 1e-12);
    assert!(ranked[0].score > ranked[1].score);

    let json = serde_json::to_value(&ranked[0]).unwrap();
    assert_eq!(json["id"], "worried");
    assert_eq!(json["name"], "Topic worried");
    assert!(json["details"]["concern_mean"].is_number());
}

#[test]
fn test_volume_increase_against_previous_window() {
    let current = vec![
        aggregate("a", 10, 10, &[]),
        aggregate("b", 10, 4, &[]),
    ];
    let previous = vec![aggregate("a", 0, 9, &[])];

    let ranked = rank_topics(&current, &previous, RankStrategy::VolumeIncreaseAbs, 5, &concern_labels());

    assert_eq!(ranked[0].topic_id, "b");
    assert_close(ranked[0].score, 4.0, 1e-12);
    assert_eq!(ranked[1].topic_id, "a");
    assert_close(ranked[1].score, 1.0, 1e-12);
}

#[test]
fn test_recent_volume_respects_limit() {
    let current: Vec<_> = (0..8)
        .map(|i| aggregate(&format!("t{i}"), 0, i as u64 + 1, &[]))
        .collect();

    let ranked = rank_topics(&current, &[], RankStrategy::RecentVolume, 3, &concern_labels());

    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].topic_id, "t7");
    assert!(ranked.iter().all(|e| e.supporting_details.is_none()));
}
