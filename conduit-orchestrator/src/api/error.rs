//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::scm::ScmError;
use crate::service::EngineError;
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    BadGateway(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::Scheduling(e) => ApiError::BadRequest(e.to_string()),
            EngineError::Forbidden(msg) => ApiError::Forbidden(msg),
            EngineError::InvalidState(msg) => ApiError::Conflict(msg),
            EngineError::Provider(e) => ApiError::BadGateway(e.to_string()),
            EngineError::Scm(ScmError::UnknownWebhookSource) => {
                ApiError::BadRequest(ScmError::UnknownWebhookSource.to_string())
            }
            EngineError::Scm(e) => ApiError::BadGateway(e.to_string()),
            EngineError::Store(StoreError::NotFound { kind, key }) => {
                ApiError::NotFound(format!("{kind} {key} not found"))
            }
            EngineError::Store(StoreError::AlreadyExists { kind, key }) => {
                ApiError::Conflict(format!("{kind} {key} already exists"))
            }
            EngineError::Store(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<ScmError> for ApiError {
    fn from(err: ScmError) -> Self {
        EngineError::from(err).into()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
