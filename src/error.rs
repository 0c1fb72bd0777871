// src/error.rs
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Everything a handler can fail with, mapped onto the HTTP surface in one place.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("not_found")]
    NotFound,

    #[error("{0}")]
    Conflict(&'static str),

    /// Transient failure the caller may retry with a fresh request.
    #[error("{0}")]
    Unavailable(&'static str),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(code) => (StatusCode::BAD_REQUEST, *code),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(code) => (StatusCode::CONFLICT, *code),
            ApiError::Unavailable(code) => (StatusCode::SERVICE_UNAVAILABLE, *code),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::Database(_) | ApiError::Internal(_) => {
                // Log the detail, hand the caller only a correlation id.
                let trace_id = Uuid::new_v4();
                error!(%trace_id, error = %self, "internal error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal_error", "traceId": trace_id })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn validation_maps_to_bad_request() {
        assert_eq!(status_of(ApiError::Validation("invalid_title")), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_of(ApiError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(status_of(ApiError::Conflict("poll_closed")), StatusCode::CONFLICT);
    }

    #[test]
    fn unavailable_maps_to_503() {
        assert_eq!(
            status_of(ApiError::Unavailable("token_generation_failed")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        assert_eq!(status_of(ApiError::Unauthenticated), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let response = ApiError::Internal("secret detail".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_body_carries_the_code() {
        let response = ApiError::Conflict("poll_closed").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "poll_closed");
    }

    #[tokio::test]
    async fn internal_body_carries_a_trace_id() {
        let response = ApiError::Internal("boom".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_error");
        assert!(body["traceId"].is_string());
    }
}
