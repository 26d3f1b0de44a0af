//! Error type returned by every handler.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use swarmboard_core::CoreError;
use tracing::error;

/// Handler error mapped onto an HTTP status.
///
/// A conflicting start is reported as 404 like a missing run, which is what the dashboard
/// client expects.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Conflict(String),
    NotFound(String),
    /// The load engine or metrics backend failed on a passthrough call.
    Upstream(String),
    Internal(CoreError),
}

impl ApiError {
    /// Maps a failed passthrough call to 502.
    pub fn upstream(err: CoreError) -> Self {
        match err {
            CoreError::EngineUnavailable { message } => Self::Upstream(message),
            other => Self::Internal(other),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            err @ CoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            other => Self::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) | ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(msg) => {
                let body = json!({ "success": false, "message": msg, "error": msg });
                return (StatusCode::BAD_GATEWAY, Json(body)).into_response();
            }
            ApiError::Internal(err) => {
                error!("Internal error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
