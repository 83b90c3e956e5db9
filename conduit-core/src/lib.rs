//! Conduit Core
//!
//! Core types and abstractions for the Conduit CI/CD orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Activity, GitAccount)
//! - DTOs: Data transfer objects exchanged with executors and API clients

pub mod domain;
pub mod dto;
