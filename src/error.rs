//! Unified error handling for the topicpulse crate
//!
//! Library code returns domain-specific errors (see
//! [`AnalyticsError`]); boundaries that mix concerns (commands, config
//! loading, the service) convert them into the single [`Error`] enum.
//!
//! # Architecture
//!
//! - [`PulseErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use topicpulse::error::{Error, ErrorCategory, PulseErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     match err.category() {
//!         ErrorCategory::Validation => eprintln!("Bad request: {err}"),
//!         _ if err.is_recoverable() => eprintln!("Retrying: {err}"),
//!         _ => eprintln!("Fatal error: {err}"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::analytics::error::AnalyticsError;

/// Common trait for all topicpulse error types
pub trait PulseErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller input the engine cannot interpret
    Validation,
    /// Signal source failures
    Source,
    /// Storage and I/O errors
    Storage,
    /// Serialization errors
    Parsing,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Source => "source",
            Self::Storage => "storage",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl PulseErrorTrait for AnalyticsError {
    fn is_recoverable(&self) -> bool {
        AnalyticsError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        if self.is_client_error() {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Source
        }
    }
}

/// Unified error type for the topicpulse crate
#[derive(Error, Debug)]
pub enum Error {
    /// Analytics engine errors
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PulseErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Analytics(e) => PulseErrorTrait::is_recoverable(e),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Analytics(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let invalid: Error = AnalyticsError::missing_parameter("window").into();
        assert_eq!(invalid.category(), ErrorCategory::Validation);

        let source: Error = AnalyticsError::source("fetch_series", "connection reset").into();
        assert_eq!(source.category(), ErrorCategory::Source);
    }

    #[test]
    fn test_is_recoverable() {
        let source: Error = AnalyticsError::source("fetch_series", "timeout").into();
        assert!(source.is_recoverable());

        let invalid: Error = AnalyticsError::malformed("topic_id", "empty").into();
        assert!(!invalid.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let unified: Error = json_err.into();
        assert!(matches!(unified, Error::Json(_)));
        assert_eq!(unified.category(), ErrorCategory::Parsing);
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("output_precision out of range");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(ErrorCategory::Other.as_str(), "other");
    }
}
