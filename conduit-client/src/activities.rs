//! Activity (run) endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use conduit_core::domain::activity::CiService;
use conduit_core::dto::activity::{ActivityView, StepLog, StepLogQuery};
use reqwest::Method;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Activity Queries
    // =============================================================================

    /// List every activity, runs awaiting approval first
    pub async fn list_activities(&self) -> Result<Vec<ActivityView>> {
        let response = self.request(Method::GET, "/activities").send().await?;
        self.handle_response(response).await
    }

    /// Get an activity by ID
    pub async fn get_activity(&self, activity_id: Uuid) -> Result<ActivityView> {
        let response = self
            .request(Method::GET, &format!("/activities/{}", activity_id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete an activity, stopping it first if it is still running
    pub async fn delete_activity(&self, activity_id: Uuid) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/activities/{}", activity_id))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Fetch the output of one step
    ///
    /// # Arguments
    /// * `tail` - Only return the last `tail` lines
    pub async fn get_step_log(
        &self,
        activity_id: Uuid,
        stage: usize,
        step: usize,
        tail: Option<usize>,
    ) -> Result<String> {
        let response = self
            .request(
                Method::GET,
                &format!("/activities/{}/stages/{}/steps/{}/log", activity_id, stage, step),
            )
            .query(&StepLogQuery { tail })
            .send()
            .await?;

        let log: StepLog = self.handle_response(response).await?;
        Ok(log.log)
    }

    /// Services (databases, caches) a step runs alongside
    pub async fn get_step_services(
        &self,
        activity_id: Uuid,
        stage: usize,
        step: usize,
    ) -> Result<Vec<CiService>> {
        let response = self
            .request(
                Method::GET,
                &format!("/activities/{}/stages/{}/steps/{}/services", activity_id, stage, step),
            )
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Run Control
    // =============================================================================

    /// Approve the pending stage. Requires [`OrchestratorClient::with_user`].
    pub async fn approve_activity(&self, activity_id: Uuid) -> Result<ActivityView> {
        self.control(activity_id, "approve").await
    }

    /// Deny the pending stage. Requires [`OrchestratorClient::with_user`].
    pub async fn deny_activity(&self, activity_id: Uuid) -> Result<ActivityView> {
        self.control(activity_id, "deny").await
    }

    /// Abort a running activity
    pub async fn stop_activity(&self, activity_id: Uuid) -> Result<ActivityView> {
        self.control(activity_id, "stop").await
    }

    /// Run a finished activity again from its first stage
    pub async fn rerun_activity(&self, activity_id: Uuid) -> Result<ActivityView> {
        self.control(activity_id, "rerun").await
    }

    async fn control(&self, activity_id: Uuid, action: &str) -> Result<ActivityView> {
        tracing::debug!("{} activity {}", action, activity_id);

        let response = self
            .request(Method::POST, &format!("/activities/{}/{}", activity_id, action))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
