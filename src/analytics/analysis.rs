//! Analysis dispatch
//!
//! Maps an `analysis_type` plus a JSON parameter object onto the typed
//! operations in [`series`](super::series), [`rolling`](super::rolling) and
//! [`decompose`](super::decompose), and wraps the result with the metadata
//! callers need to interpret it.
//!
//! Two entry points:
//! - [`analyze`] runs on an in-memory series (pure)
//! - [`execute`] handles a full [`AnalysisRequest`], fetching the series
//!   from a [`SignalSource`] first when no inline data is supplied

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::models::{OptionalPoint, SignalRecord, TimePoint, TimeSeries, DEFAULT_METRIC_COLUMN};
use crate::storage::SignalSource;

use super::decompose::{decompose, TREND_EDGE_POLICY};
use super::error::{AnalyticsError, AnalyticsResult};
use super::rolling::rolling_z_scores;
use super::series::{
    basic_stats, moving_average, percent_change, rate_of_change, z_scores, BasicStats,
    MovingAverageKind, ZScorePoint,
};

/// Parameter name selecting a column of a multiplexed stored signal
pub const METRIC_COLUMN_PARAM: &str = "metric_column_to_analyze";

// ============================================================================
// Analysis type
// ============================================================================

/// Supported analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    BasicStats,
    MovingAverage,
    RateOfChange,
    PercentChange,
    ZScore,
    StlDecomposition,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 6] = [
        Self::BasicStats,
        Self::MovingAverage,
        Self::RateOfChange,
        Self::PercentChange,
        Self::ZScore,
        Self::StlDecomposition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicStats => "basic_stats",
            Self::MovingAverage => "moving_average",
            Self::RateOfChange => "rate_of_change",
            Self::PercentChange => "percent_change",
            Self::ZScore => "z_score",
            Self::StlDecomposition => "stl_decomposition",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = AnalyticsError;

    /// Accepts the canonical snake_case names and their compact path forms
    /// (`zscore`, `movingaverage`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic_stats" | "basicstats" => Ok(Self::BasicStats),
            "moving_average" | "movingaverage" => Ok(Self::MovingAverage),
            "rate_of_change" | "rateofchange" => Ok(Self::RateOfChange),
            "percent_change" | "percentchange" => Ok(Self::PercentChange),
            "z_score" | "zscore" => Ok(Self::ZScore),
            "stl_decomposition" | "stldecomposition" => Ok(Self::StlDecomposition),
            other => {
                let supported: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                Err(AnalyticsError::invalid_parameter(
                    "analysis_type",
                    format!("unknown analysis type '{other}' (supported: {})", supported.join(", ")),
                ))
            }
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Typed analysis parameters parsed from a JSON object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisParams {
    pub window: Option<usize>,
    pub moving_average_kind: Option<MovingAverageKind>,
    pub period: Option<usize>,
    pub metric_column: Option<String>,
}

/// Fallbacks applied to parameters the caller left out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisDefaults {
    pub moving_average_kind: MovingAverageKind,
    pub moving_average_window: Option<usize>,
    pub zscore_window: Option<usize>,
    pub stl_period: Option<usize>,
}

impl AnalysisParams {
    /// Parse `window`, `type`, `period` and `metric_column_to_analyze`
    ///
    /// Unrecognized keys are ignored. A recognized key with the wrong JSON
    /// type or an out-of-range value is rejected.
    pub fn from_json(params: &Map<String, Value>) -> AnalyticsResult<Self> {
        let window = positive_integer(params, "window", 1)?;
        let period = positive_integer(params, "period", 2)?;

        let moving_average_kind = match params.get("type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                s.parse::<MovingAverageKind>()
                    .map_err(|reason| AnalyticsError::invalid_parameter("type", reason))?,
            ),
            Some(other) => {
                return Err(AnalyticsError::invalid_parameter(
                    "type",
                    format!("expected a string, got {other}"),
                ))
            }
        };

        let metric_column = match params.get(METRIC_COLUMN_PARAM) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(other) => {
                return Err(AnalyticsError::invalid_parameter(
                    METRIC_COLUMN_PARAM,
                    format!("expected a non-empty string, got {other}"),
                ))
            }
        };

        Ok(Self {
            window,
            moving_average_kind,
            period,
            metric_column,
        })
    }

    /// Fill parameters the caller omitted from configured defaults
    #[must_use]
    pub fn or_defaults(mut self, analysis_type: AnalysisType, defaults: &AnalysisDefaults) -> Self {
        match analysis_type {
            AnalysisType::MovingAverage => {
                self.window = self.window.or(defaults.moving_average_window);
                self.moving_average_kind = self
                    .moving_average_kind
                    .or(Some(defaults.moving_average_kind));
            }
            AnalysisType::ZScore => self.window = self.window.or(defaults.zscore_window),
            AnalysisType::StlDecomposition => self.period = self.period.or(defaults.stl_period),
            _ => {}
        }
        self
    }
}

fn positive_integer(params: &Map<String, Value>, name: &str, min: u64) -> AnalyticsResult<Option<usize>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v >= min => usize::try_from(v)
                .map(Some)
                .map_err(|_| AnalyticsError::invalid_parameter(name, "value is too large")),
            _ => Err(AnalyticsError::invalid_parameter(
                name,
                format!("must be an integer >= {min}, got {n}"),
            )),
        },
        Some(other) => Err(AnalyticsError::invalid_parameter(
            name,
            format!("expected an integer, got {other}"),
        )),
    }
}

// ============================================================================
// Results
// ============================================================================

/// Typed result of one analysis, tagged by `analysis_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "snake_case")]
pub enum AnalysisResult {
    BasicStats(BasicStats),

    MovingAverage {
        points: Vec<TimePoint>,
        window: usize,
        #[serde(rename = "type")]
        kind: MovingAverageKind,
    },

    RateOfChange {
        points: Vec<TimePoint>,
    },

    PercentChange {
        points: Vec<OptionalPoint>,
    },

    ZScore {
        points: Vec<ZScorePoint>,
        window: Option<usize>,
    },

    StlDecomposition {
        trend: Vec<OptionalPoint>,
        seasonal: Vec<OptionalPoint>,
        residual: Vec<OptionalPoint>,
        period_used: usize,
    },
}

impl AnalysisResult {
    #[must_use]
    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            Self::BasicStats(_) => AnalysisType::BasicStats,
            Self::MovingAverage { .. } => AnalysisType::MovingAverage,
            Self::RateOfChange { .. } => AnalysisType::RateOfChange,
            Self::PercentChange { .. } => AnalysisType::PercentChange,
            Self::ZScore { .. } => AnalysisType::ZScore,
            Self::StlDecomposition { .. } => AnalysisType::StlDecomposition,
        }
    }
}

/// Analysis result plus the context it was computed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub signal_name: String,

    #[serde(flatten)]
    pub result: AnalysisResult,

    /// Input metadata plus `time_range_analyzed`, `metric_analyzed` and
    /// decomposition caveats
    pub metadata: BTreeMap<String, String>,
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run one analysis on an in-memory series
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] when a required parameter
/// (`window` for moving averages, `period` for decomposition) is missing.
pub fn analyze(
    series: &TimeSeries,
    analysis_type: AnalysisType,
    params: &AnalysisParams,
) -> AnalyticsResult<AnalysisOutput> {
    let points = series.points.as_slice();
    let mut metadata = series.metadata.clone();

    let result = match analysis_type {
        AnalysisType::BasicStats => AnalysisResult::BasicStats(basic_stats(points)),

        AnalysisType::MovingAverage => {
            let window = params
                .window
                .ok_or_else(|| AnalyticsError::missing_parameter("window"))?;
            let kind = params.moving_average_kind.unwrap_or_default();
            AnalysisResult::MovingAverage {
                points: moving_average(points, window, kind),
                window,
                kind,
            }
        }

        AnalysisType::RateOfChange => AnalysisResult::RateOfChange {
            points: rate_of_change(points),
        },

        AnalysisType::PercentChange => AnalysisResult::PercentChange {
            points: percent_change(points),
        },

        AnalysisType::ZScore => AnalysisResult::ZScore {
            points: match params.window {
                Some(window) => rolling_z_scores(points, window),
                None => z_scores(points),
            },
            window: params.window,
        },

        AnalysisType::StlDecomposition => {
            let period = params
                .period
                .ok_or_else(|| AnalyticsError::missing_parameter("period"))?;
            let decomposition = decompose(points, period)?;

            metadata.insert(
                "decomposition_quality".to_string(),
                decomposition.quality.as_str().to_string(),
            );
            metadata.insert("trend_edge_policy".to_string(), TREND_EDGE_POLICY.to_string());

            AnalysisResult::StlDecomposition {
                trend: decomposition.trend,
                seasonal: decomposition.seasonal,
                residual: decomposition.residual,
                period_used: decomposition.period_used,
            }
        }
    };

    if let Some((start, end)) = series.time_range() {
        metadata.insert("time_range_analyzed".to_string(), format_range(start, end));
    }
    metadata.insert(
        "metric_analyzed".to_string(),
        params
            .metric_column
            .clone()
            .unwrap_or_else(|| DEFAULT_METRIC_COLUMN.to_string()),
    );

    tracing::debug!(
        signal_name = %series.signal_name,
        analysis_type = %analysis_type,
        points = points.len(),
        "Analysis complete"
    );

    Ok(AnalysisOutput {
        signal_name: series.signal_name.clone(),
        result,
        metadata,
    })
}

fn format_range(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{}/{}", start.to_rfc3339(), end.to_rfc3339())
}

/// Project one column of a multiplexed signal into a series
///
/// Rows missing the column are skipped. An empty fetch yields an empty
/// series; a column present in none of the fetched rows is an error.
///
/// # Errors
///
/// Returns [`AnalyticsError::UnknownMetricColumn`] listing the columns that
/// were present.
pub fn select_metric(
    signal_name: &str,
    records: &[SignalRecord],
    column: Option<&str>,
) -> AnalyticsResult<TimeSeries> {
    let column = column.unwrap_or(DEFAULT_METRIC_COLUMN);

    let mut points: Vec<TimePoint> = records
        .iter()
        .filter_map(|r| r.columns.get(column).map(|v| TimePoint::new(r.timestamp, *v)))
        .collect();

    if points.is_empty() && !records.is_empty() {
        let available: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.columns.keys().map(String::as_str))
            .collect();

        tracing::warn!(signal_name, column, "Requested metric column not present in signal");

        return Err(AnalyticsError::UnknownMetricColumn {
            column: column.to_string(),
            signal_name: signal_name.to_string(),
            available: available.into_iter().map(str::to_string).collect(),
        });
    }

    points.sort_by_key(|p| p.timestamp);
    Ok(TimeSeries::with_points(signal_name, points))
}

// ============================================================================
// Requests
// ============================================================================

/// Analysis request: either inline data or a stored signal and time range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series_data: Option<TimeSeries>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub analysis_type: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Accepted at the top level as well as inside `parameters`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_column_to_analyze: Option<String>,
}

/// Validate a request, resolve its series, and run the analysis
///
/// # Errors
///
/// Any [`AnalyticsError`]: bad type or parameters, missing signal name or
/// time range, unknown metric column, or a failing signal source.
pub async fn execute(
    request: &AnalysisRequest,
    source: &dyn SignalSource,
    defaults: &AnalysisDefaults,
) -> AnalyticsResult<AnalysisOutput> {
    let analysis_type: AnalysisType = request.analysis_type.parse()?;

    let mut params = AnalysisParams::from_json(&request.parameters)?;
    if params.metric_column.is_none() {
        params.metric_column = request
            .metric_column_to_analyze
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    let params = params.or_defaults(analysis_type, defaults);

    if let Some(series) = &request.time_series_data {
        // Inline points carry a single column
        if let Some(column) = params.metric_column.as_deref().filter(|c| *c != DEFAULT_METRIC_COLUMN) {
            return Err(AnalyticsError::UnknownMetricColumn {
                column: column.to_string(),
                signal_name: series.signal_name.clone(),
                available: vec![DEFAULT_METRIC_COLUMN.to_string()],
            });
        }
        return analyze(series, analysis_type, &params);
    }

    let signal_name = request
        .signal_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AnalyticsError::malformed("signal_name", "required when time_series_data is absent")
        })?;
    let start = request
        .start_time
        .ok_or_else(|| AnalyticsError::missing_parameter("start_time"))?;
    let end = request
        .end_time
        .ok_or_else(|| AnalyticsError::missing_parameter("end_time"))?;
    if start >= end {
        return Err(AnalyticsError::invalid_parameter(
            "start_time",
            "must be before end_time",
        ));
    }

    let series = source
        .fetch_series(signal_name, start, end, params.metric_column.as_deref())
        .await?;

    tracing::info!(
        signal_name,
        analysis_type = %analysis_type,
        points = series.len(),
        "Fetched signal for analysis"
    );

    let mut output = analyze(&series, analysis_type, &params)?;
    output
        .metadata
        .insert("time_range_analyzed".to_string(), format_range(start, end));
    Ok(output)
}
