//! Prometheus metrics for topicpulse
//!
//! This module provides metrics tracking for:
//! - Analytics: analysis requests and durations, documents aggregated, rankings
//! - Service: API requests, durations, rate-limited requests, cache lookups
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for analytics engine metrics
struct AnalyticsMetrics {
    analysis_requests: CounterVec,
    analysis_duration: HistogramVec,
    documents_aggregated: CounterVec,
    aggregates_stored: CounterVec,
    ranking_requests: CounterVec,
}

/// Container for HTTP service metrics
struct ServiceMetrics {
    api_requests: CounterVec,
    api_duration: HistogramVec,
    rate_limited: Counter,
    cache_lookups: CounterVec,
}

/// Global storage for analytics metrics
static ANALYTICS_METRICS: OnceLock<AnalyticsMetrics> = OnceLock::new();

/// Global storage for service metrics
static SERVICE_METRICS: OnceLock<ServiceMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Returns
///
/// `Ok(())` if all metrics were registered successfully,
/// `Err` with description if any registration failed.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let analytics = AnalyticsMetrics {
        analysis_requests: register_counter_vec!(
            "topicpulse_analysis_requests_total",
            "Total analysis requests by type and outcome",
            &["analysis_type", "outcome"]
        )?,
        analysis_duration: register_histogram_vec!(
            "topicpulse_analysis_duration_seconds",
            "Analysis duration in seconds, fetch included",
            &["analysis_type"],
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
        )?,
        documents_aggregated: register_counter_vec!(
            "topicpulse_documents_aggregated_total",
            "Total documents folded into topic aggregates",
            &["time_aggregation"]
        )?,
        aggregates_stored: register_counter_vec!(
            "topicpulse_aggregates_stored_total",
            "Total topic aggregates written to the signal store",
            &["time_aggregation"]
        )?,
        ranking_requests: register_counter_vec!(
            "topicpulse_ranking_requests_total",
            "Total ranking requests by strategy",
            &["rank_by"]
        )?,
    };

    let service = ServiceMetrics {
        api_requests: register_counter_vec!(
            "topicpulse_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "topicpulse_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        rate_limited: register_counter!(
            "topicpulse_api_rate_limited_total",
            "Total requests rejected by the rate limiter"
        )?,
        cache_lookups: register_counter_vec!(
            "topicpulse_cache_lookups_total",
            "Response cache lookups by result",
            &["result"]
        )?,
    };

    ANALYTICS_METRICS
        .set(analytics)
        .map_err(|_| "Analytics metrics already initialized")?;
    SERVICE_METRICS
        .set(service)
        .map_err(|_| "Service metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ANALYTICS_METRICS.get().is_some() && SERVICE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one analysis request (`ok` or an error kind)
pub fn record_analysis(analysis_type: &str, outcome: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.analysis_requests
            .with_label_values(&[analysis_type, outcome])
            .inc();
    }
}

/// Record documents aggregated and aggregates stored for one request
pub fn record_aggregation(time_aggregation: &str, documents: u64, aggregates: usize) {
    let Some(m) = ANALYTICS_METRICS.get() else {
        return;
    };

    m.documents_aggregated
        .with_label_values(&[time_aggregation])
        .inc_by(documents as f64);
    m.aggregates_stored
        .with_label_values(&[time_aggregation])
        .inc_by(aggregates as f64);
}

/// Record a ranking request
pub fn record_ranking(rank_by: &str) {
    if let Some(m) = ANALYTICS_METRICS.get() {
        m.ranking_requests.with_label_values(&[rank_by]).inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = SERVICE_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record a request rejected by the rate limiter
pub fn record_rate_limited() {
    if let Some(m) = SERVICE_METRICS.get() {
        m.rate_limited.inc();
    }
}

/// Record a response cache lookup
pub fn record_cache_lookup(hit: bool) {
    if let Some(m) = SERVICE_METRICS.get() {
        m.cache_lookups
            .with_label_values(&[if hit { "hit" } else { "miss" }])
            .inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start an analysis timer (returns a timer handle)
pub fn start_analysis_timer(analysis_type: &str) -> MetricsTimer {
    match ANALYTICS_METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.analysis_duration
                .with_label_values(&[analysis_type])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
