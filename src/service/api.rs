//! REST API handlers for the analytics service
//!
//! This module defines the API routes, request/response types and the
//! mapping from engine errors to HTTP responses. Numeric output is rounded
//! to the configured precision here and nowhere else.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::analytics::aggregator::aggregate_by_bucket;
use crate::analytics::analysis::{execute, AnalysisRequest, AnalysisType};
use crate::analytics::error::AnalyticsError;
use crate::analytics::ranking::{rank_topics, RankStrategy};
use crate::analytics::signals;
use crate::cache::ResponseCache;
use crate::error::{Error, ErrorCategory, PulseErrorTrait};
use crate::metrics;
use crate::models::{AggregationRequest, TimeAggregation, TopicAggregate};
use crate::storage::SignalSource;

use super::format::to_rounded_value;
use super::server::AppState;

const DEFAULT_RANKING_LIMIT: usize = 5;
const MAX_RANKING_LIMIT: usize = 20;
const DEFAULT_TOPICS_LIMIT: usize = 20;
const MAX_TOPICS_LIMIT: usize = 100;
const DEFAULT_KEYWORDS_LIMIT: usize = 10;
const MAX_KEYWORDS_LIMIT: usize = 25;
const DEFAULT_DAYS_PAST: usize = 7;
const MAX_OVERVIEW_DAYS: usize = 365;
const MAX_TOPICS_DAYS: usize = 30;
const DEFAULT_MIN_DOC_COUNT: u64 = 5;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Stable machine-readable error kind
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            kind: kind.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Result of storing aggregated documents
#[derive(Debug, Serialize)]
pub struct AggregationResponse {
    pub topic_id: String,
    pub time_aggregation: TimeAggregation,
    pub documents_received: usize,
    pub documents_in_window: usize,
    pub aggregates: Vec<TopicAggregate>,
}

// ============================================================================
// API Errors
// ============================================================================

/// Errors returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded, retry later")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Analytics(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Analytics(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Analytics(e) => e.kind(),
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Analytics(e) => Self::Analytics(e),
            other if other.category() == ErrorCategory::Validation => Self::BadRequest(other.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }

        (status, Json(ErrorResponse::new(self.to_string(), self.kind()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Query Parameters
// ============================================================================

/// Query of `POST /api/signals/aggregate`
#[derive(Debug, Default, Deserialize)]
pub struct AggregateQuery {
    pub time_aggregation: Option<String>,
}

/// Time range shared by the per-topic and trend routes
#[derive(Debug, Default, Deserialize)]
pub struct TimeRangeQuery {
    pub time_aggregation: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    pub time_aggregation: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub rank_by: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub time_aggregation: Option<String>,
    pub days_past: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopicsQuery {
    pub time_aggregation: Option<String>,
    pub days_past: Option<i64>,
    pub limit: Option<i64>,
    pub min_doc_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeywordsQuery {
    pub time_aggregation: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SentimentTrendQuery {
    pub time_aggregation: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Comma-separated labels
    pub sentiment_labels: Option<String>,
}

/// Resolved aggregation level and inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    aggregation: TimeAggregation,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    fn cache_params(&self) -> [(&'static str, String); 3] {
        [
            ("time_aggregation", self.aggregation.as_str().to_string()),
            ("start_time", self.start.to_rfc3339()),
            ("end_time", self.end.to_rfc3339()),
        ]
    }
}

fn parse_aggregation(value: Option<&str>) -> ApiResult<TimeAggregation> {
    match value {
        None => Ok(TimeAggregation::Hourly),
        Some(s) => s
            .parse()
            .map_err(|reason: String| AnalyticsError::invalid_parameter("time_aggregation", reason).into()),
    }
}

fn resolve_range(
    aggregation: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ApiResult<Window> {
    let aggregation = parse_aggregation(aggregation)?;
    let start = start.ok_or_else(|| AnalyticsError::missing_parameter("start_time"))?;
    let end = end.ok_or_else(|| AnalyticsError::missing_parameter("end_time"))?;

    if start >= end {
        return Err(AnalyticsError::invalid_parameter("start_time", "must be before end_time").into());
    }

    Ok(Window {
        aggregation,
        start,
        end,
    })
}

/// Window ending now and reaching `days_past` days back
fn trailing_window(aggregation: Option<&str>, days_past: Option<i64>, max_days: usize) -> ApiResult<(Window, usize)> {
    let aggregation = parse_aggregation(aggregation)?;
    let days = bounded(days_past, DEFAULT_DAYS_PAST, max_days, "days_past")?;
    let end = Utc::now();

    Ok((
        Window {
            aggregation,
            start: end - Duration::days(days as i64),
            end,
        },
        days,
    ))
}

/// Validate an optional integer against `1..=max`
fn bounded(value: Option<i64>, default: usize, max: usize, name: &str) -> ApiResult<usize> {
    match value {
        None => Ok(default),
        Some(v) if v >= 1 && v as u64 <= max as u64 => Ok(v as usize),
        Some(v) => Err(AnalyticsError::invalid_parameter(name, format!("must be between 1 and {max}, got {v}")).into()),
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Ingestion and analysis
        .route("/api/signals/aggregate", post(aggregate_documents))
        .route("/api/analysis", post(run_analysis))
        // Read-only signal queries
        .route("/api/signals/overview", get(get_overview))
        .route("/api/rankings/top_topics", get(get_top_topics))
        .route("/api/topics", get(list_topics))
        .route("/api/topics/{topic_id}/trend", get(get_topic_trend))
        .route(
            "/api/topics/{topic_id}/sentiment_distribution",
            get(get_sentiment_distribution),
        )
        .route("/api/topics/{topic_id}/top_keywords", get(get_top_keywords))
        .route("/api/sentiments/overall_trend", get(get_overall_sentiment_trend))
        .with_state(state)
}

// ============================================================================
// Helpers
// ============================================================================

/// Wrap, serialize and round a successful payload
fn respond<T: Serialize>(state: &AppState, data: &T) -> ApiResult<Json<Value>> {
    to_rounded_value(&ApiResponse::success(data), state.config.analysis.output_precision)
        .map(Json)
        .map_err(|e| Error::Json(e).into())
}

async fn cache_lookup(state: &AppState, key: &str) -> Option<Json<Value>> {
    match &state.cache {
        Some(cache) => cache.get(key).await.map(Json),
        None => None,
    }
}

async fn cache_store(state: &AppState, key: String, body: &Json<Value>) {
    if let Some(cache) = &state.cache {
        cache.insert(key, body.0.clone()).await;
    }
}

fn cache_key(route: &str, params: &[(&str, String)]) -> String {
    let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    ResponseCache::key(route, &borrowed)
}

async fn fetch_window(state: &AppState, window: &Window) -> ApiResult<Vec<TopicAggregate>> {
    Ok(state
        .store
        .fetch_aggregates(window.aggregation, window.start, window.end)
        .await?)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

/// Prometheus text exposition
async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::from(Error::other(format!("failed to encode metrics: {e}"))).into_response(),
    }
}

/// Aggregate a topic's documents into buckets and store them
///
/// Documents outside the optional request timeframe are not bucketed. A
/// bucket that already exists for the topic is replaced, not merged.
async fn aggregate_documents(
    State(state): State<AppState>,
    query: Result<Query<AggregateQuery>, QueryRejection>,
    body: Result<Json<AggregationRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let Json(request) = body?;
    let aggregation = parse_aggregation(query.time_aggregation.as_deref())?;

    if let (Some(start), Some(end)) = (request.timeframe_start, request.timeframe_end) {
        if start >= end {
            return Err(AnalyticsError::invalid_parameter("timeframe_start", "must be before timeframe_end").into());
        }
    }

    let documents: Vec<_> = request
        .documents
        .iter()
        .filter(|doc| request.in_timeframe(doc))
        .cloned()
        .collect();

    let dropped = request.documents.len() - documents.len();
    if dropped > 0 {
        tracing::warn!(
            topic_id = %request.topic_id,
            dropped,
            "Documents outside the requested timeframe were ignored"
        );
    }

    let aggregates = aggregate_by_bucket(&request.topic_id, &request.topic_name, &documents, aggregation)?;

    for aggregate in &aggregates {
        state.store.insert_aggregate(aggregation, aggregate.clone()).await;
    }

    let aggregated_docs: u64 = aggregates.iter().map(|a| a.document_count).sum();
    metrics::record_aggregation(aggregation.as_str(), aggregated_docs, aggregates.len());

    if let Some(cache) = &state.cache {
        cache.invalidate_all().await;
    }

    tracing::info!(
        topic_id = %request.topic_id,
        time_aggregation = %aggregation,
        documents = documents.len(),
        buckets = aggregates.len(),
        "Stored topic aggregates"
    );

    respond(
        &state,
        &AggregationResponse {
            topic_id: request.topic_id.clone(),
            time_aggregation: aggregation,
            documents_received: request.documents.len(),
            documents_in_window: documents.len(),
            aggregates,
        },
    )
}

/// Run an analysis on inline data or a stored signal
async fn run_analysis(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;

    let label = request
        .analysis_type
        .parse::<AnalysisType>()
        .map(|t| t.as_str())
        .unwrap_or("unknown");
    let _timer = metrics::start_analysis_timer(label);

    let defaults = state.config.analysis_defaults();
    let result = execute(&request, state.store.as_ref(), &defaults).await;

    metrics::record_analysis(
        label,
        match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        },
    );

    respond(&state, &result?)
}

/// Rank topics in a time window
async fn get_top_topics(
    State(state): State<AppState>,
    query: Result<Query<RankingQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let window = resolve_range(query.time_aggregation.as_deref(), query.start_time, query.end_time)?;
    let strategy: RankStrategy = match query.rank_by.as_deref() {
        Some(s) => s.parse()?,
        None => RankStrategy::default(),
    };
    let limit = bounded(query.limit, DEFAULT_RANKING_LIMIT, MAX_RANKING_LIMIT, "limit")?;

    metrics::record_ranking(strategy.as_str());

    let mut params = window.cache_params().to_vec();
    params.push(("rank_by", strategy.as_str().to_string()));
    params.push(("limit", limit.to_string()));
    let key = cache_key("rankings/top_topics", &params);
    if let Some(hit) = cache_lookup(&state, &key).await {
        return Ok(hit);
    }

    let current = fetch_window(&state, &window).await?;
    let previous = if strategy.needs_previous_window() {
        let span = window.end - window.start;
        let previous_window = Window {
            aggregation: window.aggregation,
            start: window.start - span,
            end: window.start - Duration::nanoseconds(1),
        };
        fetch_window(&state, &previous_window).await?
    } else {
        Vec::new()
    };

    let ranked = rank_topics(
        &current,
        &previous,
        strategy,
        limit,
        &state.config.analysis.concern_labels,
    );

    tracing::info!(
        rank_by = %strategy,
        candidates = current.len(),
        returned = ranked.len(),
        "Ranked topics"
    );

    let body = respond(&state, &ranked)?;
    cache_store(&state, key, &body).await;
    Ok(body)
}

/// System-wide totals over the trailing days
async fn get_overview(
    State(state): State<AppState>,
    query: Result<Query<OverviewQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (window, days) = trailing_window(query.time_aggregation.as_deref(), query.days_past, MAX_OVERVIEW_DAYS)?;

    let key = cache_key(
        "signals/overview",
        &[
            ("time_aggregation", window.aggregation.as_str().to_string()),
            ("days_past", days.to_string()),
        ],
    );
    if let Some(hit) = cache_lookup(&state, &key).await {
        return Ok(hit);
    }

    let aggregates = fetch_window(&state, &window).await?;
    let body = respond(&state, &signals::overview(&aggregates))?;
    cache_store(&state, key, &body).await;
    Ok(body)
}

/// Topics with enough documents over the trailing days
async fn list_topics(
    State(state): State<AppState>,
    query: Result<Query<TopicsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (window, days) = trailing_window(query.time_aggregation.as_deref(), query.days_past, MAX_TOPICS_DAYS)?;
    let limit = bounded(query.limit, DEFAULT_TOPICS_LIMIT, MAX_TOPICS_LIMIT, "limit")?;
    let min_doc_count = match query.min_doc_count {
        None => DEFAULT_MIN_DOC_COUNT,
        Some(n) if n >= 1 => n as u64,
        Some(n) => {
            return Err(AnalyticsError::invalid_parameter("min_doc_count", format!("must be at least 1, got {n}")).into())
        }
    };

    let key = cache_key(
        "topics",
        &[
            ("time_aggregation", window.aggregation.as_str().to_string()),
            ("days_past", days.to_string()),
            ("limit", limit.to_string()),
            ("min_doc_count", min_doc_count.to_string()),
        ],
    );
    if let Some(hit) = cache_lookup(&state, &key).await {
        return Ok(hit);
    }

    let aggregates = fetch_window(&state, &window).await?;
    let body = respond(&state, &signals::active_topics(&aggregates, min_doc_count, limit))?;
    cache_store(&state, key, &body).await;
    Ok(body)
}

/// Document volume trend of one topic
async fn get_topic_trend(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    query: Result<Query<TimeRangeQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let window = resolve_range(query.time_aggregation.as_deref(), query.start_time, query.end_time)?;

    let aggregates = fetch_window(&state, &window).await?;
    let trend = signals::topic_trend(&aggregates, &topic_id).ok_or_else(|| {
        ApiError::NotFound(format!(
            "No trend data found for topic '{topic_id}' in the given range and aggregation level"
        ))
    })?;

    respond(&state, &trend)
}

/// Document counts per dominant sentiment label for one topic
async fn get_sentiment_distribution(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    query: Result<Query<TimeRangeQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let window = resolve_range(query.time_aggregation.as_deref(), query.start_time, query.end_time)?;

    let aggregates = fetch_window(&state, &window).await?;
    respond(&state, &signals::sentiment_distribution(&aggregates, &topic_id))
}

/// Most frequent keywords of one topic
async fn get_top_keywords(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    query: Result<Query<KeywordsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let window = resolve_range(query.time_aggregation.as_deref(), query.start_time, query.end_time)?;
    let limit = bounded(query.limit, DEFAULT_KEYWORDS_LIMIT, MAX_KEYWORDS_LIMIT, "limit")?;

    let aggregates = fetch_window(&state, &window).await?;
    respond(&state, &signals::top_keywords(&aggregates, &topic_id, limit))
}

/// Mean score per sentiment label across all topics
async fn get_overall_sentiment_trend(
    State(state): State<AppState>,
    query: Result<Query<SentimentTrendQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let window = resolve_range(query.time_aggregation.as_deref(), query.start_time, query.end_time)?;

    let requested: Vec<String> = query
        .sentiment_labels
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let labels = if requested.is_empty() {
        state.config.analysis.trend_labels.clone()
    } else {
        requested
    };

    let aggregates = fetch_window(&state, &window).await?;
    respond(&state, &signals::overall_sentiment_trend(&aggregates, &labels))
}
