//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use conduit_core::domain::pipeline::Pipeline;
use conduit_core::dto::activity::ActivityView;
use conduit_core::dto::pipeline::RunStarted;
use reqwest::Method;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a new pipeline
    ///
    /// The orchestrator assigns the id, the webhook token and the next cron
    /// fire time; whatever the definition carries for those is ignored.
    ///
    /// # Returns
    /// The stored pipeline
    pub async fn create_pipeline(&self, definition: &Pipeline) -> Result<Pipeline> {
        let response = self
            .request(Method::POST, "/pipelines")
            .json(definition)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all pipelines
    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let response = self.request(Method::GET, "/pipelines").send().await?;
        self.handle_response(response).await
    }

    /// Get a pipeline by ID
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let response = self
            .request(Method::GET, &format!("/pipelines/{}", pipeline_id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Replace a pipeline's definition
    pub async fn update_pipeline(&self, pipeline_id: Uuid, definition: &Pipeline) -> Result<Pipeline> {
        let response = self
            .request(Method::PUT, &format!("/pipelines/{}", pipeline_id))
            .json(definition)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete a pipeline
    pub async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/pipelines/{}", pipeline_id))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Activate a pipeline so webhooks and its cron schedule can trigger it
    pub async fn activate_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let response = self
            .request(Method::POST, &format!("/pipelines/{}/activate", pipeline_id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deactivate a pipeline
    pub async fn deactivate_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let response = self
            .request(Method::POST, &format!("/pipelines/{}/deactivate", pipeline_id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Start a manual run
    ///
    /// # Example
    /// ```no_run
    /// # use conduit_client::OrchestratorClient;
    /// # async fn example(pipeline_id: uuid::Uuid) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let started = client.run_pipeline(pipeline_id).await?;
    /// println!("Run #{} is activity {}", started.run_sequence, started.activity_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_pipeline(&self, pipeline_id: Uuid) -> Result<RunStarted> {
        let response = self
            .request(Method::POST, &format!("/pipelines/{}/run", pipeline_id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List the runs of one pipeline
    pub async fn list_pipeline_activities(&self, pipeline_id: Uuid) -> Result<Vec<ActivityView>> {
        let response = self
            .request(Method::GET, &format!("/pipelines/{}/activities", pipeline_id))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
