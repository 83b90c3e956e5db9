//! Shared helpers for the orchestrator integration tests.
//!
//! - Fixtures (pipelines, a started orchestrator on the in-memory store)
//! - A recording provider and a scriptable source control mock

pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mocks::*;
