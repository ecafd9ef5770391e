//! topicpulse - Signal analytics engine
//!
//! Turns per-document sentiment and keyword observations into per-topic
//! time-series signals, analyzes those signals, and ranks topics by volume
//! or concern.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Core data structures (points, series, documents, aggregates)
//! - [`analytics`] - Aggregation, time-series operations, decomposition, ranking
//! - [`storage`] - Signal source abstraction and the in-memory store
//! - [`service`] - axum HTTP API over the engine
//! - [`cache`] - TTL response cache
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Crate-level error type
//!
//! # Example
//!
//! ```no_run
//! use topicpulse::analytics::{analyze, AnalysisParams, AnalysisType};
//! use topicpulse::models::TimeSeries;
//!
//! fn main() -> anyhow::Result<()> {
//!     let series: TimeSeries = serde_json::from_str(r#"{"signal_name": "s", "points": []}"#)?;
//!     let output = analyze(&series, AnalysisType::BasicStats, &AnalysisParams::default())?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod service;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{
        analyze, execute, rank_topics, AnalysisOutput, AnalysisParams, AnalysisRequest,
        AnalysisType, AnalyticsError, AnalyticsResult, RankStrategy, TopicRankEntry,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, PulseErrorTrait, Result};
    pub use crate::models::{
        DocumentSignal, SignalRecord, TimeAggregation, TimePoint, TimeSeries, TopicAggregate,
    };
    pub use crate::storage::{MemorySignalStore, SignalSource};
}

// Direct re-exports for convenience
pub use models::{DocumentSignal, TimeAggregation, TimePoint, TimeSeries, TopicAggregate};
