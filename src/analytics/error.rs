//! Error types for signal analytics
//!
//! Insufficient data is never an error here: operations return empty
//! sequences or `None` values instead. These variants cover requests the
//! engine cannot interpret at all.

use thiserror::Error;

/// Result type alias for analytics operations
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Identified failures of the analytics engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    /// Unknown analysis type, unknown strategy, or a missing/invalid parameter
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Requested metric column is not present in the fetched data
    #[error(
        "Unknown metric column '{column}' for signal '{signal_name}' (available: {})",
        .available.join(", ")
    )]
    UnknownMetricColumn {
        column: String,
        signal_name: String,
        available: Vec<String>,
    },

    /// Input is missing a required identifying field
    #[error("Malformed input field '{field}': {reason}")]
    MalformedInput { field: String, reason: String },

    /// The external signal source failed
    #[error("Signal source failed during '{operation}': {reason}")]
    Source { operation: String, reason: String },
}

impl AnalyticsError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing required parameter error
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: "required parameter is missing".to_string(),
        }
    }

    /// Create a malformed input error
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a signal source error
    pub fn source(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Source {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller sent something the engine cannot accept
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Source { .. })
    }

    /// Whether retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Source { .. })
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::UnknownMetricColumn { .. } => "unknown_metric_column",
            Self::MalformedInput { .. } => "malformed_input",
            Self::Source { .. } => "source_error",
        }
    }
}
