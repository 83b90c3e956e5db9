//! Remote build executor
//!
//! Drives an executor service over HTTP. Work is accepted asynchronously;
//! progress comes back through the orchestrator's step callbacks.

use async_trait::async_trait;
use conduit_core::domain::activity::{Activity, ENV_NODE_NAME, services_before};
use conduit_core::dto::activity::{RunStepRequest, StepLog, StepLogQuery};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{PipelineProvider, ProviderError};

/// Executor reply to a run request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunAccepted {
    node_name: String,
}

#[derive(Debug, Clone)]
pub struct RemoteProvider {
    /// Executor base URL (e.g., "http://localhost:9090")
    base_url: String,
    client: Client,
}

impl RemoteProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn run_url(&self, activity: &Activity) -> String {
        format!("{}/runs/{}", self.base_url, activity.id)
    }

    fn accept(activity: &mut Activity, accepted: RunAccepted) {
        if !accepted.node_name.is_empty() {
            activity
                .env_vars
                .insert(ENV_NODE_NAME.to_string(), accepted.node_name.clone());
            activity.node_name = accepted.node_name;
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Executor {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<(), ProviderError> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Executor {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl PipelineProvider for RemoteProvider {
    async fn run_pipeline(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        let url = format!("{}/runs", self.base_url);
        let response = self.client.post(&url).json(&*activity).send().await?;

        let accepted: RunAccepted = self.handle_response(response).await?;
        Self::accept(activity, accepted);
        tracing::debug!("Executor accepted activity {}", activity.id);
        Ok(())
    }

    async fn rerun_activity(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        let url = format!("{}/rerun", self.run_url(activity));
        let response = self.client.post(&url).json(&*activity).send().await?;

        let accepted: RunAccepted = self.handle_response(response).await?;
        Self::accept(activity, accepted);
        Ok(())
    }

    async fn run_stage(&self, activity: &Activity, stage: usize) -> Result<(), ProviderError> {
        let url = format!("{}/stages/{}", self.run_url(activity), stage);
        let body = RunStepRequest {
            activity: activity.clone(),
            services: services_before(activity, stage, 0),
        };
        let response = self.client.post(&url).json(&body).send().await?;

        self.handle_empty_response(response).await
    }

    async fn run_step(&self, activity: &Activity, stage: usize, step: usize) -> Result<(), ProviderError> {
        let url = format!("{}/stages/{}/steps/{}", self.run_url(activity), stage, step);
        let body = RunStepRequest {
            activity: activity.clone(),
            services: services_before(activity, stage, step),
        };
        let response = self.client.post(&url).json(&body).send().await?;

        self.handle_empty_response(response).await
    }

    async fn stop_activity(&self, activity: &Activity) -> Result<(), ProviderError> {
        let url = format!("{}/stop", self.run_url(activity));
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }

    async fn sync_activity(&self, activity: &mut Activity) -> Result<(), ProviderError> {
        let response = self.client.get(self.run_url(activity)).send().await?;
        let observed: Activity = self.handle_response(response).await?;

        if observed.id != activity.id {
            return Err(ProviderError::Rejected(format!(
                "executor returned activity {} for {}",
                observed.id, activity.id
            )));
        }
        if observed.stages.len() != activity.stages.len() {
            return Err(ProviderError::Rejected(format!(
                "executor reports {} stages for activity {}, expected {}",
                observed.stages.len(),
                activity.id,
                activity.stages.len()
            )));
        }

        activity.status = observed.status;
        activity.stages = observed.stages;
        activity.pending_stage = observed.pending_stage;
        activity.stop_ts = observed.stop_ts;
        if !observed.fail_message.is_empty() {
            activity.fail_message = observed.fail_message;
        }
        if !observed.node_name.is_empty() {
            activity.node_name = observed.node_name;
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
        let url = format!("{}/stages/{}/steps/{}/log", self.run_url(activity), stage, step);
        let mut request = self.client.get(&url);
        if let Some(tail) = query.tail {
            request = request.query(&[("tail", tail)]);
        }
        let response = request.send().await?;

        let log: StepLog = self.handle_response(response).await?;
        Ok(log.log)
    }

    async fn delete_former_build(&self, activity: &Activity) -> Result<(), ProviderError> {
        let url = format!("{}/build", self.run_url(activity));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    async fn on_activity_complete(&self, activity: &Activity) {
        let url = format!("{}/complete", self.run_url(activity));
        let result = match self.client.post(&url).json(activity).send().await {
            Ok(response) => self.handle_empty_response(response).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("Completion hook for activity {} failed: {}", activity.id, e);
        }
    }
}
