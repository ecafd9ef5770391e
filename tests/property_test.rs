//! Property tests for the time-series operations

mod common;

use proptest::prelude::*;

use common::hourly_points;
use topicpulse::analytics::{
    basic_stats, concern_score, decompose, moving_average, percent_change, rate_of_change,
    rolling_z_scores, z_scores, MovingAverageKind,
};

fn values(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1_000.0f64..1_000.0, 0..max_len)
}

fn kind() -> impl Strategy<Value = MovingAverageKind> {
    prop_oneof![Just(MovingAverageKind::Simple), Just(MovingAverageKind::Weighted)]
}

proptest! {
    #[test]
    fn prop_count_matches_length(vs in values(64)) {
        let stats = basic_stats(&hourly_points(&vs));
        prop_assert_eq!(stats.count, vs.len());
        prop_assert_eq!(stats.mean.is_none(), vs.is_empty());
    }

    #[test]
    fn prop_stats_bounds(vs in values(64)) {
        prop_assume!(!vs.is_empty());
        let stats = basic_stats(&hourly_points(&vs));
        let (min, max, mean) = (stats.min.unwrap(), stats.max.unwrap(), stats.mean.unwrap());

        prop_assert!(min <= mean + 1e-9 && mean <= max + 1e-9);
        prop_assert!(stats.variance.unwrap() >= 0.0);
    }

    #[test]
    fn prop_moving_average_length(vs in values(48), window in 1usize..10, kind in kind()) {
        let ma = moving_average(&hourly_points(&vs), window, kind);
        let expected = if vs.len() >= window { vs.len() - window + 1 } else { 0 };
        prop_assert_eq!(ma.len(), expected);
    }

    #[test]
    fn prop_moving_average_window_one_is_identity(vs in values(48), kind in kind()) {
        let points = hourly_points(&vs);
        let ma = moving_average(&points, 1, kind);

        prop_assert_eq!(ma.len(), points.len());
        for (a, p) in ma.iter().zip(&points) {
            prop_assert_eq!(a.timestamp, p.timestamp);
            prop_assert!((a.value - p.value).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_rate_of_change_relation(vs in values(48)) {
        let points = hourly_points(&vs);
        let roc = rate_of_change(&points);

        prop_assert_eq!(roc.len(), points.len().saturating_sub(1));
        for (i, r) in roc.iter().enumerate() {
            prop_assert_eq!(r.timestamp, points[i + 1].timestamp);
            prop_assert!((r.value - (vs[i + 1] - vs[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_percent_change_null_iff_previous_zero(
        vs in prop::collection::vec(prop_oneof![Just(0.0f64), -100.0f64..100.0], 0..48)
    ) {
        let changes = percent_change(&hourly_points(&vs));

        prop_assert_eq!(changes.len(), vs.len().saturating_sub(1));
        for (i, c) in changes.iter().enumerate() {
            prop_assert_eq!(c.value.is_none(), vs[i] == 0.0);
        }
    }

    #[test]
    fn prop_z_scores_standardize(vs in prop::collection::vec(-1_000.0f64..1_000.0, 2..64)) {
        let zs = z_scores(&hourly_points(&vs));
        let scores: Vec<f64> = zs.iter().map(|z| z.z_score.unwrap()).collect();
        let n = scores.len() as f64;

        let mean = scores.iter().sum::<f64>() / n;
        prop_assert!(mean.abs() < 1e-6);

        let spread = vs.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b))
            - vs.iter().fold(f64::INFINITY, |a, b| a.min(*b));
        if spread > 1e-3 {
            let std = (scores.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n).sqrt();
            prop_assert!((std - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn prop_constant_series_scores_zero(value in -1_000.0f64..1_000.0, len in 1usize..32, window in 1usize..8) {
        let points = hourly_points(&vec![value; len]);

        prop_assert!(z_scores(&points).iter().all(|z| z.z_score == Some(0.0)));

        let rolling = rolling_z_scores(&points, window);
        for (i, z) in rolling.iter().enumerate() {
            if i + 1 < window {
                prop_assert!(z.z_score.is_none());
            } else {
                prop_assert_eq!(z.z_score, Some(0.0));
            }
        }
    }

    #[test]
    fn prop_decomposition_identity(vs in values(60), period in 2usize..8) {
        let points = hourly_points(&vs);
        let result = decompose(&points, period).unwrap();

        prop_assert_eq!(result.trend.len(), vs.len());
        for i in 0..vs.len() {
            if let (Some(t), Some(s), Some(r)) =
                (result.trend[i].value, result.seasonal[i].value, result.residual[i].value)
            {
                prop_assert!((t + s + r - vs[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn prop_operations_are_idempotent(vs in values(40), window in 1usize..6) {
        let points = hourly_points(&vs);

        prop_assert_eq!(basic_stats(&points), basic_stats(&points));
        prop_assert_eq!(
            moving_average(&points, window, MovingAverageKind::Weighted),
            moving_average(&points, window, MovingAverageKind::Weighted)
        );
        prop_assert_eq!(rolling_z_scores(&points, window), rolling_z_scores(&points, window));
    }

    #[test]
    fn prop_concern_score_bounded_and_monotone(
        mean in 0.0f64..1.0,
        docs in 0u64..1_000,
        extra in 0u64..1_000,
    ) {
        let max_docs = docs + extra;
        let score = concern_score(mean, docs, max_docs);
        prop_assert!((0.0..=1.0).contains(&score));

        // More documents never lowers the score
        let more = concern_score(mean, docs + extra, max_docs);
        prop_assert!(more + 1e-12 >= score);
    }
}
