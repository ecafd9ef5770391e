//! HTTP server for the analytics service
//!
//! Wires the signal store, response cache and rate limiter into shared
//! state and serves the API router with CORS, request tracing and
//! metrics middleware.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::ResponseCache;
use crate::config::{Config, ServerConfig};
use crate::storage::MemorySignalStore;

use super::api::{create_router, ApiError};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Signal store read by analyses and written by aggregation
    pub store: Arc<MemorySignalStore>,

    /// Response cache for read-only queries (disabled when `None`)
    pub cache: Option<Arc<ResponseCache>>,

    /// Global request rate limiter (disabled when `None`)
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state around an existing store
    pub fn new(config: Config, store: Arc<MemorySignalStore>) -> Self {
        let cache = ResponseCache::from_config(&config.cache).map(Arc::new);
        let limiter = build_rate_limiter(&config.server).map(Arc::new);

        Self {
            store,
            cache,
            limiter,
            start_time: Instant::now(),
            config: Arc::new(config),
        }
    }
}

/// Limiter allowing `rate_limit_requests` per `rate_limit_window_secs`, bursting up to the full budget
fn build_rate_limiter(config: &ServerConfig) -> Option<DefaultDirectRateLimiter> {
    let requests = NonZeroU32::new(config.rate_limit_requests)?;
    let window = Duration::from_secs(config.rate_limit_window_secs);
    let quota = Quota::with_period(window / requests.get())?.allow_burst(requests);
    Some(RateLimiter::direct(quota))
}

// ============================================================================
// Middleware
// ============================================================================

/// Reject requests over the configured rate with 429
async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        let exempt = matches!(request.uri().path(), "/api/health" | "/metrics");
        if !exempt && limiter.check().is_err() {
            crate::metrics::record_rate_limited();
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            return ApiError::RateLimited.into_response();
        }
    }

    next.run(request).await
}

/// Record request count and latency per matched route
async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let started = Instant::now();
    let response = next.run(request).await;

    crate::metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Server
// ============================================================================

/// Analytics HTTP server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Create a server with an empty in-memory store
    pub fn new(config: Config) -> Result<Self, ServerError> {
        Self::with_store(config, Arc::new(MemorySignalStore::new()))
    }

    /// Create a server around an existing store
    pub fn with_store(config: Config, store: Arc<MemorySignalStore>) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(format!("{e:#}")))?;

        Ok(Self {
            state: AppState::new(config, store),
        })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.state.config.server.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;

        tracing::info!(%addr, "Analytics server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Analytics server shutdown complete");
        Ok(())
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        let server = &self.state.config.server;
        ServerInfo {
            bind_address: server.bind_address,
            cors_enabled: server.enable_cors,
            request_logging_enabled: server.enable_request_logging,
            cache_enabled: self.state.cache.is_some(),
            rate_limit: self
                .state
                .limiter
                .as_ref()
                .map(|_| (server.rate_limit_requests, server.rate_limit_window_secs)),
        }
    }
}

/// Router with middleware applied according to the state's configuration
pub fn build_router(state: AppState) -> Router {
    let server = state.config.server.clone();

    let mut router = create_router(state.clone())
        .route_layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn_with_state(state, rate_limit));

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    if server.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
    pub cache_enabled: bool,
    /// `(requests, window_secs)` when rate limiting is on
    pub rate_limit: Option<(u32, u64)>,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        let rate_limit = match self.rate_limit {
            Some((requests, window)) => format!("{requests} requests / {window}s"),
            None => "disabled".to_string(),
        };

        format!(
            "topicpulse API Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             CORS: {}\n\
             Request Logging: {}\n\
             Response Cache: {}\n\
             Rate Limit: {}",
            "",
            self.bind_address,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" },
            if self.cache_enabled { "enabled" } else { "disabled" },
            rate_limit
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}
