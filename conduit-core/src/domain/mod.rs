//! Core domain types
//!
//! This module contains the core domain structures used across Conduit services.
//! Pipelines are the versioned definitions, activities are the runs, and git
//! accounts hold the credentials needed to reach the source repositories.

pub mod account;
pub mod activity;
pub mod pipeline;
