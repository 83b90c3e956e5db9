//! Health and maintenance handlers

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use conduit_core::domain::activity::PRESERVED_ENVS;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /api/envvars
/// Environment variable names set by the orchestrator on every run
pub async fn preserved_env_vars() -> Json<Vec<&'static str>> {
    Json(PRESERVED_ENVS.to_vec())
}

/// POST /api/reset
/// Remove every pipeline, activity and account
pub async fn reset(State(state): State<AppState>) -> ApiResult<StatusCode> {
    tracing::warn!("Resetting all orchestrator data");

    state.coordinator.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}
