//! Configuration management for topicpulse
//!
//! Configuration is loaded from environment variables (`TOPICPULSE_*`) or
//! from a TOML file; every section falls back to its defaults, so a file
//! only needs the keys it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::analytics::analysis::AnalysisDefaults;
use crate::analytics::ranking::DEFAULT_CONCERN_LABELS;
use crate::analytics::series::MovingAverageKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Analysis defaults and output formatting
    pub analysis: AnalysisConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// Requests allowed per client per window (0 disables rate limiting)
    pub rate_limit_requests: u32,

    /// Rate limit window in seconds
    pub rate_limit_window_secs: u64,
}

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Decimal places kept in serialized numeric output
    pub output_precision: u32,

    /// Sentiment labels averaged by the `high_concern_score` ranking
    pub concern_labels: Vec<String>,

    /// Labels reported by the overall sentiment trend when none are requested
    pub trend_labels: Vec<String>,

    /// Rolling window used for z-scores when the request has none
    pub default_zscore_window: Option<usize>,

    /// Period used for decomposition when the request has none
    pub default_stl_period: Option<usize>,

    /// Window used for moving averages when the request has none
    pub default_moving_average_window: Option<usize>,

    /// Moving average weighting when the request has none
    pub default_moving_average_type: MovingAverageKind,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of read-only query responses
    pub enabled: bool,

    /// Entry time-to-live in seconds
    pub ttl_secs: u64,

    /// Maximum number of cached responses
    pub max_entries: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            enable_cors: true,
            enable_request_logging: true,
            rate_limit_requests: 100,
            rate_limit_window_secs: 60,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            output_precision: 4,
            concern_labels: DEFAULT_CONCERN_LABELS.iter().map(|s| s.to_string()).collect(),
            trend_labels: ["Concerned", "Anxious", "Satisfied", "Angry"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_zscore_window: None,
            default_stl_period: None,
            default_moving_average_window: None,
            default_moving_average_type: MovingAverageKind::Simple,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_address = match std::env::var("TOPICPULSE_BIND_ADDRESS") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid TOPICPULSE_BIND_ADDRESS: {addr}"))?,
            Err(_) => defaults.server.bind_address,
        };

        let config = Self {
            server: ServerConfig {
                bind_address,
                enable_cors: env_parse("TOPICPULSE_ENABLE_CORS").unwrap_or(defaults.server.enable_cors),
                enable_request_logging: env_parse("TOPICPULSE_REQUEST_LOGGING")
                    .unwrap_or(defaults.server.enable_request_logging),
                rate_limit_requests: env_parse("TOPICPULSE_RATE_LIMIT_REQUESTS")
                    .unwrap_or(defaults.server.rate_limit_requests),
                rate_limit_window_secs: env_parse("TOPICPULSE_RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or(defaults.server.rate_limit_window_secs),
            },
            analysis: AnalysisConfig {
                output_precision: env_parse("TOPICPULSE_OUTPUT_PRECISION")
                    .unwrap_or(defaults.analysis.output_precision),
                concern_labels: env_list("TOPICPULSE_CONCERN_LABELS")
                    .unwrap_or(defaults.analysis.concern_labels),
                trend_labels: env_list("TOPICPULSE_TREND_LABELS").unwrap_or(defaults.analysis.trend_labels),
                default_zscore_window: env_parse("TOPICPULSE_DEFAULT_ZSCORE_WINDOW")
                    .or(defaults.analysis.default_zscore_window),
                default_stl_period: env_parse("TOPICPULSE_DEFAULT_STL_PERIOD")
                    .or(defaults.analysis.default_stl_period),
                default_moving_average_window: env_parse("TOPICPULSE_DEFAULT_MA_WINDOW")
                    .or(defaults.analysis.default_moving_average_window),
                default_moving_average_type: env_parse("TOPICPULSE_DEFAULT_MA_TYPE")
                    .unwrap_or(defaults.analysis.default_moving_average_type),
            },
            cache: CacheConfig {
                enabled: env_parse("TOPICPULSE_CACHE_ENABLED").unwrap_or(defaults.cache.enabled),
                ttl_secs: env_parse("TOPICPULSE_CACHE_TTL_SECS").unwrap_or(defaults.cache.ttl_secs),
                max_entries: env_parse("TOPICPULSE_CACHE_MAX_ENTRIES").unwrap_or(defaults.cache.max_entries),
            },
            logging: LoggingConfig {
                level: std::env::var("TOPICPULSE_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("TOPICPULSE_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        };

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.analysis.output_precision > 12 {
            anyhow::bail!("output_precision must be at most 12");
        }

        if self.analysis.concern_labels.is_empty() {
            anyhow::bail!("concern_labels must name at least one label");
        }

        if matches!(self.analysis.default_zscore_window, Some(0)) {
            anyhow::bail!("default_zscore_window must be greater than 0");
        }

        if matches!(self.analysis.default_moving_average_window, Some(0)) {
            anyhow::bail!("default_moving_average_window must be greater than 0");
        }

        if matches!(self.analysis.default_stl_period, Some(p) if p < 2) {
            anyhow::bail!("default_stl_period must be at least 2");
        }

        if self.server.rate_limit_requests > 0 && self.server.rate_limit_window_secs == 0 {
            anyhow::bail!("rate_limit_window_secs must be greater than 0");
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            anyhow::bail!("cache max_entries must be greater than 0 when the cache is enabled");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Analysis parameter fallbacks derived from this configuration
    #[must_use]
    pub fn analysis_defaults(&self) -> AnalysisDefaults {
        AnalysisDefaults {
            moving_average_kind: self.analysis.default_moving_average_type,
            moving_average_window: self.analysis.default_moving_average_window,
            zscore_window: self.analysis.default_zscore_window,
            stl_period: self.analysis.default_stl_period,
        }
    }

    /// Get cache TTL as Duration
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
