//! Build providers
//!
//! The provider executes stages and steps on real infrastructure and reports
//! progress back through the step-start / step-finish callbacks.

pub mod remote;

pub use remote::RemoteProvider;

use async_trait::async_trait;
use conduit_core::domain::activity::Activity;
use conduit_core::dto::activity::StepLogQuery;

/// Provider error type
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("executor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("executor returned {status}: {message}")]
    Executor { status: u16, message: String },

    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait PipelineProvider: Send + Sync {
    /// Begin executing a freshly created activity from its first stage
    async fn run_pipeline(&self, activity: &mut Activity) -> Result<(), ProviderError>;

    /// Execute a reset activity again from the start
    async fn rerun_activity(&self, activity: &mut Activity) -> Result<(), ProviderError>;

    async fn run_stage(&self, activity: &Activity, stage: usize) -> Result<(), ProviderError>;

    async fn run_step(&self, activity: &Activity, stage: usize, step: usize) -> Result<(), ProviderError>;

    /// Halt any work still running for the activity
    async fn stop_activity(&self, activity: &Activity) -> Result<(), ProviderError>;

    /// Refresh the activity with the state observed by the executor
    async fn sync_activity(&self, activity: &mut Activity) -> Result<(), ProviderError>;

    async fn get_step_log(
        &self,
        activity: &Activity,
        stage: usize,
        step: usize,
        query: &StepLogQuery,
    ) -> Result<String, ProviderError>;

    /// Remove workspaces and artifacts left by a previous run
    async fn delete_former_build(&self, activity: &Activity) -> Result<(), ProviderError>;

    /// Called once when the activity reaches Success or Fail
    async fn on_activity_complete(&self, activity: &Activity);
}
