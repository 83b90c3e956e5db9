//! Executor Callback Handlers
//!
//! Step progress reported by the build executor.

use axum::{
    Form,
    extract::{Query, State, rejection::FormRejection},
    http::StatusCode,
};
use conduit_core::dto::activity::{StepEvent, StepFinishEvent, StepFinishForm};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /events/step-start?id=..&stageOrdinal=..&stepOrdinal=..
pub async fn step_start(
    State(state): State<AppState>,
    Query(event): Query<StepEvent>,
) -> ApiResult<StatusCode> {
    state.coordinator.step_started(&event).await?;
    Ok(StatusCode::OK)
}

/// POST /events/step-finish?id=..&stageOrdinal=..&stepOrdinal=..&status=SUCCESS|FAILURE
/// The first step may send its commit as a `GIT_COMMIT` form field; other
/// steps usually send no body at all.
pub async fn step_finish(
    State(state): State<AppState>,
    Query(event): Query<StepFinishEvent>,
    form: Result<Form<StepFinishForm>, FormRejection>,
) -> ApiResult<StatusCode> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    state.coordinator.step_finished(&event, form.git_commit).await?;
    Ok(StatusCode::OK)
}
