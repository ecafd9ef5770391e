//! HTTP service exposing the analytics engine
//!
//! - `api`: routes, handlers and error mapping
//! - `server`: shared state, middleware and the server lifecycle
//! - `format`: numeric rounding at the response boundary

pub mod api;
pub mod format;
pub mod server;

pub use api::{create_router, ApiError, ApiResponse, ErrorResponse, HealthResponse};
pub use format::{round_numbers, to_rounded_value};
pub use server::{build_router, ApiServer, AppState, ServerError, ServerInfo};
