//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management and manual runs.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use conduit_core::domain::pipeline::{Pipeline, TriggerType};
use conduit_core::dto::activity::ActivityView;
use conduit_core::dto::pipeline::RunStarted;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::{AppState, user_id};

/// POST /pipelines
/// Create a new pipeline
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<Pipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = state.coordinator.create_pipeline(req).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipelines
/// List all pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<Pipeline>>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = state.coordinator.list_pipelines().await?;
    Ok(Json(pipelines))
}

/// GET /pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = state.coordinator.get_pipeline(id).await?;
    Ok(Json(pipeline))
}

/// PUT /pipelines/{id}
pub async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<Pipeline>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Updating pipeline: {}", id);

    let pipeline = state.coordinator.update_pipeline(id, req).await?;
    Ok(Json(pipeline))
}

/// DELETE /pipelines/{id}
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    state.coordinator.delete_pipeline(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pipelines/{id}/activate
pub async fn activate_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = state.coordinator.activate_pipeline(id).await?;
    Ok(Json(pipeline))
}

/// POST /pipelines/{id}/deactivate
pub async fn deactivate_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = state.coordinator.deactivate_pipeline(id).await?;
    Ok(Json(pipeline))
}

/// POST /pipelines/{id}/run
/// Start a manual run
pub async fn run_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunStarted>> {
    tracing::info!("Manual run of pipeline: {}", id);

    let activity = state.coordinator.run_pipeline(id, TriggerType::Manual).await?;
    Ok(Json(RunStarted {
        activity_id: activity.id,
        run_sequence: activity.run_sequence,
    }))
}

/// GET /pipelines/{id}/activities
pub async fn list_pipeline_activities(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ActivityView>>> {
    let user = user_id(&headers);
    let activities = state.coordinator.list_pipeline_activities(id).await?;

    Ok(Json(
        activities
            .into_iter()
            .map(|a| ActivityView::for_user(a, user.as_deref()))
            .collect(),
    ))
}
