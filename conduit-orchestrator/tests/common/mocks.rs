//! Recording mocks for the provider and source control seams.

use async_trait::async_trait;
use conduit_core::domain::activity::{Activity, ActivityStatus};
use conduit_core::domain::pipeline::Pipeline;
use conduit_core::dto::activity::StepLogQuery;
use conduit_orchestrator::provider::{PipelineProvider, ProviderError};
use conduit_orchestrator::scm::{ScmError, SourceControl, WebhookRequest};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// A provider call as observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    RunPipeline(Uuid),
    Rerun(Uuid),
    RunStage(Uuid, usize),
    RunStep(Uuid, usize, usize),
    Stop(Uuid),
    Sync(Uuid),
    StepLog(Uuid, usize, usize),
    DeleteBuild(Uuid),
    Complete(Uuid, ActivityStatus),
}

/// Provider that records every call and succeeds unless told otherwise.
#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<Vec<ProviderCall>>,
    pub fail_run_pipeline: AtomicBool,
    pub fail_next_work: AtomicBool,
    /// Status reported by `sync_activity`, if any
    pub synced_status: Mutex<Option<ActivityStatus>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: Uuid) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                ProviderCall::RunPipeline(a)
                | ProviderCall::Rerun(a)
                | ProviderCall::RunStage(a, _)
                | ProviderCall::RunStep(a, _, _)
                | ProviderCall::Stop(a)
                | ProviderCall::Sync(a)
                | ProviderCall::StepLog(a, _, _)
                | ProviderCall::DeleteBuild(a)
                | ProviderCall::Complete(a, _) => *a == id,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_work_result(&self) -> Result<(), ProviderError> {
        if self.fail_next_work.load(Ordering::SeqCst) {
            return Err(ProviderError::Executor {
                status: 503,
                message: "executor unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineProvider for MockProvider {
    async fn run_pipeline(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        self.record(ProviderCall::RunPipeline(activity.id));
        if self.fail_run_pipeline.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("no capacity".to_string()));
        }
        activity.node_name = "mock-node".to_string();
        Ok(())
    }

    async fn rerun_activity(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        self.record(ProviderCall::Rerun(activity.id));
        Ok(())
    }

    async fn run_stage(&self, activity: &Activity, stage: usize) -> Result<(), ProviderError> {
        self.record(ProviderCall::RunStage(activity.id, stage));
        self.next_work_result()
    }

    async fn run_step(&self, activity: &Activity, stage: usize, step: usize) -> Result<(), ProviderError> {
        self.record(ProviderCall::RunStep(activity.id, stage, step));
        self.next_work_result()
    }

    async fn stop_activity(&self, activity: &Activity) -> Result<(), ProviderError> {
        self.record(ProviderCall::Stop(activity.id));
        Ok(())
    }

    async fn sync_activity(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        self.record(ProviderCall::Sync(activity.id));
        if let Some(status) = *self.synced_status.lock().unwrap() {
            activity.status = status;
        }
        Ok(())
    }

    async fn get_step_log(
        &self,
        activity: &Activity,
        stage: usize,
        step: usize,
        query: &StepLogQuery,
    ) -> Result<String, ProviderError> {
        self.record(ProviderCall::StepLog(activity.id, stage, step));
        Ok(format!("log of {stage}/{step} tail={:?}", query.tail))
    }

    async fn delete_former_build(&self, activity: &Activity) -> Result<(), ProviderError> {
        self.record(ProviderCall::DeleteBuild(activity.id));
        Ok(())
    }

    async fn on_activity_complete(&self, activity: &Activity) {
        self.record(ProviderCall::Complete(activity.id, activity.status));
    }
}

/// Source control with a settable branch head and verification verdict.
pub struct MockScm {
    pub head: Mutex<String>,
    pub accept_webhooks: AtomicBool,
    queried_urls: Mutex<Vec<String>>,
}

impl Default for MockScm {
    fn default() -> Self {
        Self {
            head: Mutex::new("0000000".to_string()),
            accept_webhooks: AtomicBool::new(true),
            queried_urls: Mutex::new(Vec::new()),
        }
    }
}

#[allow(dead_code)]
impl MockScm {
    pub fn set_head(&self, commit: &str) {
        *self.head.lock().unwrap() = commit.to_string();
    }

    pub fn queried_urls(&self) -> Vec<String> {
        self.queried_urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceControl for MockScm {
    async fn head_commit(&self, repo_url: &str, _branch: &str) -> Result<String, ScmError> {
        self.queried_urls.lock().unwrap().push(repo_url.to_string());
        Ok(self.head.lock().unwrap().clone())
    }

    fn verify_webhook_payload(&self, _pipeline: &Pipeline, _request: &WebhookRequest) -> bool {
        self.accept_webhooks.load(Ordering::SeqCst)
    }
}
