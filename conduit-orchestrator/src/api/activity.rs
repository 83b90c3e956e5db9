//! Activity API Handlers
//!
//! HTTP endpoints for run history and run control.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use conduit_core::domain::activity::CiService;
use conduit_core::dto::activity::{ActivityView, StepLog, StepLogQuery};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::{AppState, user_id};

// =============================================================================
// Queries
// =============================================================================

/// GET /activities
/// List all activities, those awaiting approval first
pub async fn list_activities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ActivityView>>> {
    tracing::debug!("Listing all activities");

    let user = user_id(&headers);
    let activities = state.coordinator.list_activities().await?;
    Ok(Json(
        activities
            .into_iter()
            .map(|a| ActivityView::for_user(a, user.as_deref()))
            .collect(),
    ))
}

/// GET /activities/{id}
pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ActivityView>> {
    let activity = state.coordinator.get_activity(id).await?;
    Ok(Json(ActivityView::for_user(activity, user_id(&headers).as_deref())))
}

/// DELETE /activities/{id}
pub async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting activity: {}", id);

    state.coordinator.delete_activity(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /activities/{id}/stages/{stage}/steps/{step}/log
pub async fn get_step_log(
    State(state): State<AppState>,
    Path((id, stage, step)): Path<(Uuid, usize, usize)>,
    Query(query): Query<StepLogQuery>,
) -> ApiResult<Json<StepLog>> {
    let log = state.coordinator.get_step_log(id, stage, step, &query).await?;
    Ok(Json(StepLog { log }))
}

/// GET /activities/{id}/stages/{stage}/steps/{step}/services
pub async fn get_services(
    State(state): State<AppState>,
    Path((id, stage, step)): Path<(Uuid, usize, usize)>,
) -> ApiResult<Json<Vec<CiService>>> {
    let services = state.coordinator.get_services(id, stage, step).await?;
    Ok(Json(services))
}

// =============================================================================
// Run Control
// =============================================================================

/// POST /activities/{id}/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ActivityView>> {
    let user = user_id(&headers);
    let activity = state.coordinator.approve(id, user.as_deref()).await?;
    Ok(Json(ActivityView::for_user(activity, user.as_deref())))
}

/// POST /activities/{id}/deny
pub async fn deny(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ActivityView>> {
    let user = user_id(&headers);
    let activity = state.coordinator.deny(id, user.as_deref()).await?;
    Ok(Json(ActivityView::for_user(activity, user.as_deref())))
}

/// POST /activities/{id}/stop
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ActivityView>> {
    let activity = state.coordinator.stop(id).await?;
    Ok(Json(ActivityView::for_user(activity, user_id(&headers).as_deref())))
}

/// POST /activities/{id}/rerun
pub async fn rerun(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ActivityView>> {
    let activity = state.coordinator.rerun(id).await?;
    Ok(Json(ActivityView::for_user(activity, user_id(&headers).as_deref())))
}
