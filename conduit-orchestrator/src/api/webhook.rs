//! Webhook API Handler
//!
//! Push notifications from GitHub and GitLab.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
};
use conduit_core::dto::pipeline::{RunStarted, WebhookQuery};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::scm::WebhookRequest;

/// POST /api/webhook?pipelineId=..
/// Run the pipeline for a verified push; ping events answer `null`
pub async fn receive(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Option<RunStarted>>> {
    let request = WebhookRequest::from_parts(&headers, body.to_vec())?;
    tracing::info!(
        "Webhook {:?} '{}' for pipeline {}",
        request.source,
        request.event,
        query.pipeline_id
    );

    let started = state
        .coordinator
        .trigger_webhook(query.pipeline_id, request)
        .await?
        .map(|activity| RunStarted {
            activity_id: activity.id,
            run_sequence: activity.run_sequence,
        });
    Ok(Json(started))
}
