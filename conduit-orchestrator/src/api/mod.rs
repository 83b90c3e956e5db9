//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod account;
pub mod activity;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod system;
pub mod webhook;
pub mod ws;

use axum::{
    Router,
    http::HeaderMap,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Coordinator;

/// Header carrying the identity of the calling user
pub const USER_HEADER: &str = "X-User-Id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub(crate) fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Create the main API router with all endpoints
pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    let api = Router::new()
        // Pipeline endpoints
        .route(
            "/pipelines",
            get(pipeline::list_pipelines).post(pipeline::create_pipeline),
        )
        .route(
            "/pipelines/{id}",
            get(pipeline::get_pipeline)
                .put(pipeline::update_pipeline)
                .delete(pipeline::delete_pipeline),
        )
        .route("/pipelines/{id}/activate", post(pipeline::activate_pipeline))
        .route("/pipelines/{id}/deactivate", post(pipeline::deactivate_pipeline))
        .route("/pipelines/{id}/run", post(pipeline::run_pipeline))
        .route(
            "/pipelines/{id}/activities",
            get(pipeline::list_pipeline_activities),
        )
        // Activity endpoints
        .route("/activities", get(activity::list_activities))
        .route(
            "/activities/{id}",
            get(activity::get_activity).delete(activity::delete_activity),
        )
        .route("/activities/{id}/approve", post(activity::approve))
        .route("/activities/{id}/deny", post(activity::deny))
        .route("/activities/{id}/stop", post(activity::stop))
        .route("/activities/{id}/rerun", post(activity::rerun))
        .route(
            "/activities/{id}/stages/{stage}/steps/{step}/log",
            get(activity::get_step_log),
        )
        .route(
            "/activities/{id}/stages/{stage}/steps/{step}/services",
            get(activity::get_services),
        )
        // Executor callbacks
        .route("/events/step-start", post(event::step_start))
        .route("/events/step-finish", post(event::step_finish))
        .route("/webhook", post(webhook::receive))
        // Accounts
        .route(
            "/accounts",
            get(account::list_accounts).post(account::create_account),
        )
        .route("/accounts/{id}", delete(account::delete_account))
        // Maintenance and live updates
        .route("/envvars", get(system::preserved_env_vars))
        .route("/reset", post(system::reset))
        .route("/ws", get(ws::subscribe));

    Router::new()
        .route("/health", get(system::health_check))
        .nest("/api", api)
        .with_state(AppState { coordinator })
        .layer(TraceLayer::new_for_http())
}
