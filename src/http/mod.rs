//! HTTP surface: routes, admission middleware, and the server.

mod admission;
mod error;
mod handlers;
pub mod identity;
mod server;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

pub use admission::{Admission, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
pub use error::ApiError;
pub use server::HttpServer;

use crate::ratelimit::RateLimiter;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The admission store
    pub limiter: Arc<RateLimiter>,
    /// Largest request body buffered by the admission middleware
    pub max_body_bytes: usize,
}

impl AppState {
    /// Create state around an existing store.
    pub fn new(limiter: Arc<RateLimiter>, max_body_bytes: usize) -> Self {
        Self {
            limiter,
            max_body_bytes,
        }
    }
}

/// Build the application router.
///
/// Only `/api/data` passes through the admission middleware.
pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/api/data", get(handlers::get_data).post(handlers::post_data))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission::admission,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/rate-limit-status", get(handlers::rate_limit_status))
        .route("/api/reset-rate-limit", post(handlers::reset_rate_limit))
        .merge(limited)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
