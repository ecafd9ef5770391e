//! Core time-series operations
//!
//! Pure functions over ordered point slices:
//! - Basic statistics (population variance)
//! - Simple and weighted moving averages
//! - Rate of change and percent change
//! - Whole-series z-score normalization
//!
//! Every function allocates a fresh output and never mutates its input.
//! Degenerate input yields empty output or `None` fields, never a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use std::str::FromStr;

use crate::models::{OptionalPoint, TimePoint};

/// Standard deviations at or below this (relative to the mean's magnitude) are treated as zero
const ZERO_STD_TOLERANCE: f64 = 1e-12;

/// Summary statistics; all numeric fields are `None` for an empty series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub count: usize,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
    pub variance: Option<f64>,
}

impl BasicStats {
    fn empty() -> Self {
        Self {
            count: 0,
            sum: None,
            mean: None,
            median: None,
            min: None,
            max: None,
            std_dev: None,
            variance: None,
        }
    }
}

/// Compute count, sum, mean, median, min, max and population variance/std
#[must_use]
pub fn basic_stats(points: &[TimePoint]) -> BasicStats {
    if points.is_empty() {
        return BasicStats::empty();
    }

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let count = values.len();

    let sum: f64 = values.iter().sum();
    let mean = values.iter().mean();
    let variance = if count == 1 {
        0.0
    } else {
        values.iter().population_variance().max(0.0)
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    BasicStats {
        count,
        sum: Some(sum),
        mean: Some(mean),
        median: Some(median(&values)),
        min: Some(min),
        max: Some(max),
        std_dev: Some(variance.sqrt()),
        variance: Some(variance),
    }
}

/// Median of a non-empty slice; even counts average the two middle values
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Weighting scheme for moving averages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovingAverageKind {
    /// Equal weights
    #[default]
    Simple,

    /// Linear weights 1..=window, newest point heaviest
    Weighted,
}

impl MovingAverageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Weighted => "weighted",
        }
    }
}

impl fmt::Display for MovingAverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovingAverageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "sma" => Ok(Self::Simple),
            "weighted" | "wma" => Ok(Self::Weighted),
            other => Err(format!("unsupported moving average type '{other}'")),
        }
    }
}

/// Moving average aligned to the last timestamp of each window
///
/// Output length is `len - window + 1`; shorter input (or `window == 0`)
/// yields an empty vector.
#[must_use]
pub fn moving_average(points: &[TimePoint], window: usize, kind: MovingAverageKind) -> Vec<TimePoint> {
    if window == 0 || points.len() < window {
        return Vec::new();
    }

    let weight_total = (window * (window + 1)) as f64 / 2.0;

    points
        .windows(window)
        .map(|w| {
            let value = match kind {
                MovingAverageKind::Simple => w.iter().map(|p| p.value).sum::<f64>() / window as f64,
                MovingAverageKind::Weighted => {
                    w.iter()
                        .enumerate()
                        .map(|(i, p)| (i + 1) as f64 * p.value)
                        .sum::<f64>()
                        / weight_total
                }
            };
            TimePoint::new(w[window - 1].timestamp, value)
        })
        .collect()
}

/// First difference `p[i] - p[i-1]`, stamped at `t[i]`
#[must_use]
pub fn rate_of_change(points: &[TimePoint]) -> Vec<TimePoint> {
    points
        .windows(2)
        .map(|w| TimePoint::new(w[1].timestamp, w[1].value - w[0].value))
        .collect()
}

/// Percent change `100 * (p[i] - p[i-1]) / p[i-1]`; `None` where the previous value is zero
#[must_use]
pub fn percent_change(points: &[TimePoint]) -> Vec<OptionalPoint> {
    points
        .windows(2)
        .map(|w| {
            let previous = w[0].value;
            let value = if previous == 0.0 {
                None
            } else {
                Some(100.0 * (w[1].value - previous) / previous)
            };
            OptionalPoint {
                timestamp: w[1].timestamp,
                value,
            }
        })
        .collect()
}

/// Z-score of one point; `None` until a rolling window fills
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScorePoint {
    pub timestamp: DateTime<Utc>,
    pub original_value: f64,
    pub z_score: Option<f64>,
}

/// Whether a standard deviation is zero up to floating-point noise
pub(crate) fn is_zero_std(std_dev: f64, mean: f64) -> bool {
    !std_dev.is_finite() || std_dev <= ZERO_STD_TOLERANCE * (1.0 + mean.abs())
}

/// Z-scores against the whole-series mean and population standard deviation
///
/// A constant series (zero deviation) maps every point to 0.
#[must_use]
pub fn z_scores(points: &[TimePoint]) -> Vec<ZScorePoint> {
    if points.is_empty() {
        return Vec::new();
    }

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let mean = values.iter().mean();
    let std_dev = values.iter().population_std_dev();
    let flat = is_zero_std(std_dev, mean);

    points
        .iter()
        .map(|p| ZScorePoint {
            timestamp: p.timestamp,
            original_value: p.value,
            z_score: Some(if flat { 0.0 } else { (p.value - mean) / std_dev }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hourly(values: &[f64]) -> Vec<TimePoint> {
        let start = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| TimePoint::new(start + Duration::hours(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_basic_stats_scenario() {
        let stats = basic_stats(&hourly(&[20.0, 22.5, 21.0, 23.0, 20.5]));

        assert_eq!(stats.count, 5);
        assert!((stats.mean.unwrap() - 21.4).abs() < 1e-9);
        assert_eq!(stats.min, Some(20.0));
        assert_eq!(stats.max, Some(23.0));
        assert_eq!(stats.median, Some(21.0));
        assert!((stats.sum.unwrap() - 107.0).abs() < 1e-9);
        // population variance: (1.96 + 1.21 + 0.16 + 2.56 + 0.81) / 5
        assert!((stats.variance.unwrap() - 1.34).abs() < 1e-9);
    }

    #[test]
    fn test_basic_stats_empty_and_single() {
        let empty = basic_stats(&[]);
        assert_eq!(empty.count, 0);
        assert!(empty.mean.is_none());
        assert!(empty.std_dev.is_none());

        let single = basic_stats(&hourly(&[7.5]));
        assert_eq!(single.count, 1);
        assert_eq!(single.variance, Some(0.0));
        assert_eq!(single.std_dev, Some(0.0));
        assert_eq!(single.median, Some(7.5));
    }

    #[test]
    fn test_median_even_count() {
        let stats = basic_stats(&hourly(&[4.0, 1.0, 3.0, 2.0]));
        assert_eq!(stats.median, Some(2.5));
    }

    #[test]
    fn test_moving_average_scenario() {
        let points = hourly(&[15.0, 18.0, 12.0, 20.0, 22.0, 17.0, 19.0]);
        let ma = moving_average(&points, 3, MovingAverageKind::Simple);

        assert_eq!(ma.len(), 5);
        assert!((ma[0].value - 15.0).abs() < 1e-12);
        assert_eq!(ma[0].timestamp, points[2].timestamp);
        assert_eq!(ma[4].timestamp, points[6].timestamp);
    }

    #[test]
    fn test_moving_average_short_input() {
        let points = hourly(&[1.0, 2.0]);
        assert!(moving_average(&points, 3, MovingAverageKind::Simple).is_empty());
        assert!(moving_average(&points, 0, MovingAverageKind::Simple).is_empty());
    }

    #[test]
    fn test_moving_average_window_one_is_identity() {
        let points = hourly(&[0.1, 0.2, 0.3]);
        assert_eq!(moving_average(&points, 1, MovingAverageKind::Simple), points);
    }

    #[test]
    fn test_weighted_moving_average() {
        let points = hourly(&[1.0, 2.0, 3.0]);
        let wma = moving_average(&points, 3, MovingAverageKind::Weighted);
        // (1*1 + 2*2 + 3*3) / 6
        assert!((wma[0].value - 14.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rate_of_change() {
        let points = hourly(&[10.0, 12.0, 9.0]);
        let roc = rate_of_change(&points);

        assert_eq!(roc.len(), 2);
        assert_eq!(roc[0].value, 2.0);
        assert_eq!(roc[1].value, -3.0);
        assert_eq!(roc[1].timestamp, points[2].timestamp);
        assert!(rate_of_change(&points[..1]).is_empty());
    }

    #[test]
    fn test_percent_change_zero_previous() {
        let points = hourly(&[0.0, 5.0, 10.0]);
        let pct = percent_change(&points);

        assert_eq!(pct.len(), 2);
        assert!(pct[0].value.is_none());
        assert_eq!(pct[1].value, Some(100.0));
    }

    #[test]
    fn test_z_scores_constant_series() {
        let z = z_scores(&hourly(&[3.0, 3.0, 3.0, 3.0]));
        assert!(z.iter().all(|p| p.z_score == Some(0.0)));
    }

    #[test]
    fn test_z_scores_normalized() {
        let z = z_scores(&hourly(&[1.0, 2.0, 3.0, 4.0, 10.0]));
        let scores: Vec<f64> = z.iter().map(|p| p.z_score.unwrap()).collect();

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        assert!(mean.abs() < 1e-9);
        assert!((var.sqrt() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_average_kind_parse() {
        assert_eq!("Simple".parse::<MovingAverageKind>().unwrap(), MovingAverageKind::Simple);
        assert_eq!("weighted".parse::<MovingAverageKind>().unwrap(), MovingAverageKind::Weighted);
        assert!("exponential".parse::<MovingAverageKind>().is_err());
    }
}
