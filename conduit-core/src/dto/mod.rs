//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs exchanged between the orchestrator, build
//! executors and API clients.

pub mod account;
pub mod activity;
pub mod event;
pub mod pipeline;
