//! Route handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::admission::Admission;
use super::error::ApiError;
use super::identity;
use super::AppState;
use crate::ratelimit::{format_timestamp, retry_after_secs};

/// Rate-limit snapshot echoed in successful responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: String,
}

impl From<&Admission> for RateLimitInfo {
    fn from(admission: &Admission) -> Self {
        Self {
            limit: admission.limit,
            remaining: admission.remaining,
            reset_time: format_timestamp(admission.reset_time),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse {
    pub success: bool,
    pub message: &'static str,
    pub user_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_data: Option<Value>,
    pub rate_limit_info: RateLimitInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub user_id: String,
    pub limit: u32,
    pub window_ms: u64,
    pub remaining: u32,
    pub reset_time: String,
    pub reset_in_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub user_id: String,
}

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": format_timestamp(state.limiter.now()),
        "activeKeys": state.limiter.active_keys(),
    }))
}

/// GET /api/data
pub async fn get_data(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
) -> Json<DataResponse> {
    Json(DataResponse {
        success: true,
        message: "Data retrieved successfully",
        user_id: admission.user_id.clone(),
        timestamp: format_timestamp(state.limiter.now()),
        received_data: None,
        rate_limit_info: RateLimitInfo::from(&admission),
    })
}

/// POST /api/data. An empty body echoes as `{}`.
pub async fn post_data(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    body: Bytes,
) -> Result<Json<DataResponse>, ApiError> {
    let received = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Internal(format!("malformed request body: {}", e)))?
    };

    Ok(Json(DataResponse {
        success: true,
        message: "Data received successfully",
        user_id: admission.user_id.clone(),
        timestamp: format_timestamp(state.limiter.now()),
        received_data: Some(received),
        rate_limit_info: RateLimitInfo::from(&admission),
    }))
}

/// GET /api/rate-limit-status. Never counts against the quota.
pub async fn rate_limit_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Json<StatusResponse> {
    let user_id = identity::resolve_or_anonymous(&headers, &uri, &[]);
    let status = state.limiter.peek_status(&user_id);
    let now = state.limiter.now();

    Json(StatusResponse {
        limit: state.limiter.max_requests(),
        window_ms: u64::try_from(state.limiter.window().as_millis()).unwrap_or(u64::MAX),
        remaining: status.remaining,
        reset_time: format_timestamp(status.window_end),
        reset_in_seconds: retry_after_secs(status.window_end, now),
        user_id,
    })
}

/// POST /api/reset-rate-limit. Requires an explicit identity.
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<Json<ResetResponse>, ApiError> {
    let user_id = identity::resolve(&headers, &uri, &body).ok_or(ApiError::MissingIdentity)?;

    let existed = state.limiter.reset(&user_id);
    info!(user_id = %user_id, existed = existed, "Rate limit reset");

    Ok(Json(ResetResponse {
        success: true,
        message: format!("Rate limit reset for user {}", user_id),
        user_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::{body_json, create_test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use tower::ServiceExt;

    fn request(method: &str, uri: &str, user: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-ID", user);
        }
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _clock) = create_test_app();

        let response = app
            .oneshot(request("GET", "/health", None, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["timestamp"], "2024-01-01T00:00:00.000Z");
        assert_eq!(body["activeKeys"], 0);
    }

    #[tokio::test]
    async fn test_get_data_payload() {
        let (app, _clock) = create_test_app();

        let response = app
            .oneshot(request("GET", "/api/data", Some("user-1"), Body::empty()))
            .await
            .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["userId"], "user-1");
        assert!(body.get("receivedData").is_none());
        assert_eq!(body["rateLimitInfo"]["limit"], 5);
        assert_eq!(body["rateLimitInfo"]["remaining"], 4);
        assert_eq!(body["rateLimitInfo"]["resetTime"], "2024-01-01T00:01:00.000Z");
    }

    #[tokio::test]
    async fn test_post_data_echoes_body() {
        let (app, _clock) = create_test_app();

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/data",
                Some("user-1"),
                Body::from(r#"{"message":"hello"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["receivedData"]["message"], "hello");

        let response = app
            .oneshot(request("POST", "/api/data", Some("user-1"), Body::empty()))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["receivedData"], serde_json::json!({}));
        assert_eq!(body["rateLimitInfo"]["remaining"], 3);
    }

    #[tokio::test]
    async fn test_post_data_malformed_body() {
        let (app, _clock) = create_test_app();

        let response = app
            .oneshot(request(
                "POST",
                "/api/data",
                Some("user-1"),
                Body::from("{not json"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "An unexpected error occurred");
    }

    #[tokio::test]
    async fn test_status_for_unknown_user() {
        let (app, _clock) = create_test_app();

        let response = app
            .oneshot(request(
                "GET",
                "/api/rate-limit-status?userId=user-1",
                None,
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["userId"], "user-1");
        assert_eq!(body["limit"], 5);
        assert_eq!(body["windowMs"], 60_000);
        assert_eq!(body["remaining"], 5);
        assert_eq!(body["resetTime"], "2024-01-01T00:01:00.000Z");
        assert_eq!(body["resetInSeconds"], 60);
    }

    #[tokio::test]
    async fn test_status_is_read_only() {
        let (app, clock) = create_test_app();

        for _ in 0..2 {
            app.clone()
                .oneshot(request("GET", "/api/data", Some("user-1"), Body::empty()))
                .await
                .unwrap();
        }

        clock.advance(Duration::seconds(15));
        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(request(
                    "GET",
                    "/api/rate-limit-status",
                    Some("user-1"),
                    Body::empty(),
                ))
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body["remaining"], 3);
            assert_eq!(body["resetInSeconds"], 45);
        }

        let response = app
            .oneshot(request("GET", "/api/data", Some("user-1"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
    }

    #[tokio::test]
    async fn test_reset_requires_identity() {
        let (app, _clock) = create_test_app();

        let response = app
            .oneshot(request(
                "POST",
                "/api/reset-rate-limit",
                None,
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Bad Request");
    }

    #[tokio::test]
    async fn test_reset_restores_quota() {
        let (app, _clock) = create_test_app();

        for _ in 0..6 {
            app.clone()
                .oneshot(request("GET", "/api/data", Some("user-1"), Body::empty()))
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/reset-rate-limit",
                None,
                Body::from(r#"{"userId":"user-1"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Rate limit reset for user user-1");

        let response = app
            .oneshot(request("GET", "/api/data", Some("user-1"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    }

    #[tokio::test]
    async fn test_reset_does_not_touch_other_users() {
        let (app, _clock) = create_test_app();

        for _ in 0..5 {
            app.clone()
                .oneshot(request("GET", "/api/data", Some("user-b"), Body::empty()))
                .await
                .unwrap();
        }

        app.clone()
            .oneshot(request(
                "POST",
                "/api/reset-rate-limit",
                Some("user-a"),
                Body::empty(),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request("GET", "/api/data", Some("user-b"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
