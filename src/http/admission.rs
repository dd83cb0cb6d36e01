//! Admission middleware for rate-limited routes.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use super::error::ApiError;
use super::identity;
use super::AppState;
use crate::ratelimit::{format_timestamp, retry_after_secs, AdmissionDecision, RateLimiter};

/// Configured maximum per window.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left after this one.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// ISO-8601 instant at which the window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Admission outcome handed to the wrapped handler as a request extension.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Key the request was counted against
    pub user_id: String,
    /// Configured maximum per window
    pub limit: u32,
    /// Requests left in the window
    pub remaining: u32,
    /// When the window resets
    pub reset_time: DateTime<Utc>,
}

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceeded {
    pub error: &'static str,
    pub message: String,
    pub reset_time: String,
    pub retry_after: u64,
}

/// Count the request against its user key, then forward or reject it.
///
/// The body is buffered so the `userId` field can be read, and handed back
/// to the handler untouched. Buffering honours the router's body limit, so an
/// oversized body is refused with 413 before any quota is spent.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match Bytes::from_request(Request::from_parts(parts.clone(), body), &state).await {
        Ok(bytes) => bytes,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            debug!(limit = state.max_body_bytes, "Request body too large");
            return rejection.into_response();
        }
        Err(rejection) => {
            return ApiError::Internal(format!("failed to read request body: {}", rejection))
                .into_response()
        }
    };

    let user_id = identity::resolve_or_anonymous(&parts.headers, &parts.uri, &bytes);
    let decision = state.limiter.check_and_consume(&user_id);
    let limit = state.limiter.max_requests();

    let mut response = if decision.allowed {
        let mut request = Request::from_parts(parts, Body::from(bytes));
        request.extensions_mut().insert(Admission {
            user_id,
            limit,
            remaining: decision.remaining,
            reset_time: decision.window_end,
        });
        next.run(request).await
    } else {
        reject(&state.limiter, &decision)
    };

    set_rate_limit_headers(response.headers_mut(), limit, &decision);
    response
}

fn reject(limiter: &RateLimiter, decision: &AdmissionDecision) -> Response {
    let retry_after = retry_after_secs(decision.window_end, limiter.now());
    let body = RateLimitExceeded {
        error: "Too Many Requests",
        message: format!(
            "Rate limit exceeded. Maximum {} requests per {} seconds allowed.",
            limiter.max_requests(),
            limiter.window().as_secs()
        ),
        reset_time: format_timestamp(decision.window_end),
        retry_after,
    };

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, HeaderValue::from(retry_after))],
        Json(body),
    )
        .into_response()
}

fn set_rate_limit_headers(headers: &mut HeaderMap, limit: u32, decision: &AdmissionDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&format_timestamp(decision.window_end)) {
        headers.insert(X_RATELIMIT_RESET, reset);
    }
}
