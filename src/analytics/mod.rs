//! Signal analytics engine
//!
//! - `aggregator`: per-document observations to per-topic aggregates
//! - `series`, `rolling`, `decompose`: time-series operations
//! - `analysis`: typed dispatch over those operations
//! - `ranking`: topic ranking strategies
//! - `signals`: read-only queries over stored aggregates

pub mod aggregator;
pub mod analysis;
pub mod decompose;
pub mod error;
pub mod ranking;
pub mod rolling;
pub mod series;
pub mod signals;

pub use aggregator::{aggregate_by_bucket, aggregate_request, aggregate_topic, signal_record, topic_signal_name};
pub use analysis::{
    analyze, execute, select_metric, AnalysisDefaults, AnalysisOutput, AnalysisParams,
    AnalysisRequest, AnalysisResult, AnalysisType,
};
pub use decompose::{decompose, Decomposition, DecompositionQuality};
pub use error::{AnalyticsError, AnalyticsResult};
pub use ranking::{concern_score, rank_topics, RankStrategy, TopicRankEntry, DEFAULT_CONCERN_LABELS};
pub use rolling::{rolling_z_scores, RollingWindow};
pub use series::{
    basic_stats, moving_average, percent_change, rate_of_change, z_scores, BasicStats,
    MovingAverageKind, ZScorePoint,
};
