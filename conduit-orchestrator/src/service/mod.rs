//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The coordinator drives runs through the activity state machine and keeps
//! pipelines, the scheduler and the change hub in step with it.

pub mod activity;
pub mod coordinator;
pub mod error;
pub mod pipeline;

pub use activity as activity_service;
pub use coordinator::Coordinator;
pub use error::EngineError;
pub use pipeline as pipeline_service;
