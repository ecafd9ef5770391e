//! Additive seasonal-trend decomposition
//!
//! Splits a series into `trend + seasonal + residual`:
//!
//! 1. Trend is a centered moving average of length `period`. Odd periods use
//!    a symmetric window; even periods use the classical 2×period average
//!    with half weights at both ends. Edge points where the window does not
//!    fit have no trend value.
//! 2. The seasonal index of phase `i % period` is the mean of the detrended
//!    values available at that phase, tiled over the series.
//! 3. Residual is whatever is left where both trend and seasonal exist.
//!
//! Series shorter than two full periods are decomposed anyway but flagged as
//! approximate.

use serde::{Deserialize, Serialize};

use crate::models::{OptionalPoint, TimePoint};

use super::error::{AnalyticsError, AnalyticsResult};

/// Smallest period that has a meaningful seasonal component
pub const MIN_PERIOD: usize = 2;

/// How trustworthy a decomposition is given the series length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionQuality {
    /// At least two full periods of data
    Full,
    /// Fewer than two full periods; seasonal indices rest on few samples
    Approximate,
}

impl DecompositionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Approximate => "approximate",
        }
    }
}

/// Treatment of trend values at the series boundaries
pub const TREND_EDGE_POLICY: &str = "omitted";

/// Decomposition components aligned to the input timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub trend: Vec<OptionalPoint>,
    pub seasonal: Vec<OptionalPoint>,
    pub residual: Vec<OptionalPoint>,
    pub period_used: usize,
    pub quality: DecompositionQuality,
}

/// Decompose `points` with the given seasonal period
///
/// # Arguments
///
/// * `points` - Series sorted by timestamp
/// * `period` - Number of points per seasonal cycle (at least 2)
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] when `period < 2`.
pub fn decompose(points: &[TimePoint], period: usize) -> AnalyticsResult<Decomposition> {
    if period < MIN_PERIOD {
        return Err(AnalyticsError::invalid_parameter(
            "period",
            format!("must be at least {MIN_PERIOD}, got {period}"),
        ));
    }

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let trend = centered_moving_average(&values, period);
    let indices = seasonal_indices(&values, &trend, period);

    let seasonal: Vec<Option<f64>> = (0..values.len()).map(|i| indices[i % period]).collect();

    let residual: Vec<Option<f64>> = values
        .iter()
        .zip(trend.iter().zip(&seasonal))
        .map(|(v, (t, s))| match (t, s) {
            (Some(t), Some(s)) => Some(v - t - s),
            _ => None,
        })
        .collect();

    let quality = if values.len() < 2 * period {
        tracing::warn!(
            points = values.len(),
            period,
            "Series shorter than two periods, decomposition is approximate"
        );
        DecompositionQuality::Approximate
    } else {
        DecompositionQuality::Full
    };

    Ok(Decomposition {
        trend: align(points, trend),
        seasonal: align(points, seasonal),
        residual: align(points, residual),
        period_used: period,
        quality,
    })
}

fn align(points: &[TimePoint], values: Vec<Option<f64>>) -> Vec<OptionalPoint> {
    points
        .iter()
        .zip(values)
        .map(|(p, value)| OptionalPoint {
            timestamp: p.timestamp,
            value,
        })
        .collect()
}

/// Centered moving average; `None` where the window would leave the series
fn centered_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = period / 2;
    let even = period % 2 == 0;

    (0..n)
        .map(|i| {
            if i < half || i + half >= n {
                return None;
            }

            let window = &values[i - half..=i + half];
            let sum = if even {
                // 2×period average: the two outermost points carry half weight
                let inner: f64 = window[1..window.len() - 1].iter().sum();
                inner + 0.5 * (window[0] + window[window.len() - 1])
            } else {
                window.iter().sum()
            };

            Some(sum / period as f64)
        })
        .collect()
}

/// Mean detrended value per phase; `None` for phases with no trend coverage
fn seasonal_indices(values: &[f64], trend: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];

    for (i, (value, t)) in values.iter().zip(trend).enumerate() {
        if let Some(t) = t {
            sums[i % period] += value - t;
            counts[i % period] += 1;
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
        .collect()
}
