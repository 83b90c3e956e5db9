//! Git Account API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use conduit_core::domain::account::GitAccount;
use conduit_core::dto::account::CreateAccount;

use crate::api::error::ApiResult;
use crate::api::{AppState, user_id};

/// POST /api/accounts
/// Register a git account owned by the requesting user
pub async fn create_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAccount>,
) -> ApiResult<(StatusCode, Json<GitAccount>)> {
    let owner = user_id(&headers).unwrap_or_default();
    let account = state.coordinator.create_account(req, &owner).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts
/// Access tokens are never returned
pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<Json<Vec<GitAccount>>> {
    let accounts = state.coordinator.list_accounts().await?;
    Ok(Json(accounts))
}

/// DELETE /api/accounts/{id}
pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.coordinator.delete_account(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
