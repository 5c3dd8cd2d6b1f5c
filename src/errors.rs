use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::load_balancer::GateError;

/// Suggested wait when the upstream gate is saturated.
pub const CAPACITY_RETRY_AFTER_SECS: u64 = 5;

/// Rejections and failures at the API boundary.
/// Implements `IntoResponse` so handlers can return `Result<T, ApiError>`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Service temporarily overloaded")]
    Capacity { retry_after_secs: u64 },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid input: {0:?}")]
    Validation(Vec<String>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::AtCapacity => ApiError::Capacity {
                retry_after_secs: CAPACITY_RETRY_AFTER_SECS,
            },
            GateError::Upstream(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Capacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Capacity { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": "Service temporarily overloaded. Please try again in a moment.",
                    "retryAfter": retry_after_secs
                })),
            )
                .into_response(),
            ApiError::RateLimited { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": "Rate limit exceeded. Please try again later.",
                    "retryAfter": retry_after_secs
                })),
            )
                .into_response(),
            ApiError::Validation(details) => (
                status,
                Json(json!({
                    "error": "Invalid input",
                    "details": details
                })),
            )
                .into_response(),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    status,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
