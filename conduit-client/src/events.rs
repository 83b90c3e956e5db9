//! Executor callbacks
//!
//! Build executors report step progress through these endpoints; the
//! orchestrator advances the activity and dispatches the next work item.

use crate::OrchestratorClient;
use crate::error::Result;
use conduit_core::dto::activity::{StepEvent, StepFinishEvent, StepFinishForm, StepOutcome};
use reqwest::Method;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Step Callbacks
    // =============================================================================

    /// Report that a step began executing
    pub async fn report_step_start(&self, activity_id: Uuid, stage: usize, step: usize) -> Result<()> {
        let event = StepEvent {
            id: activity_id,
            stage_ordinal: stage,
            step_ordinal: step,
        };
        let response = self
            .request(Method::POST, "/events/step-start")
            .query(&event)
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Report that a step finished
    ///
    /// # Arguments
    /// * `git_commit` - The commit checked out, sent by the first step only
    ///
    /// # Example
    /// ```no_run
    /// # use conduit_client::OrchestratorClient;
    /// # use conduit_core::dto::activity::StepOutcome;
    /// # async fn example(activity_id: uuid::Uuid) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// client
    ///     .report_step_finish(activity_id, 0, 0, StepOutcome::Success, Some("9fceb02".into()))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn report_step_finish(
        &self,
        activity_id: Uuid,
        stage: usize,
        step: usize,
        status: StepOutcome,
        git_commit: Option<String>,
    ) -> Result<()> {
        tracing::debug!(
            "Step {}/{} of activity {} finished: {}",
            stage,
            step,
            activity_id,
            status
        );

        let event = StepFinishEvent {
            id: activity_id,
            stage_ordinal: stage,
            step_ordinal: step,
            status,
        };
        let mut request = self.request(Method::POST, "/events/step-finish").query(&event);
        if git_commit.is_some() {
            request = request.form(&StepFinishForm { git_commit });
        }
        let response = request.send().await?;

        self.handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_finish_query_encoding() {
        let client = OrchestratorClient::new("http://localhost:8080");
        let id = Uuid::nil();
        let event = StepFinishEvent {
            id,
            stage_ordinal: 1,
            step_ordinal: 2,
            status: StepOutcome::Failure,
        };
        let request = client
            .request(Method::POST, "/events/step-finish")
            .query(&event)
            .form(&StepFinishForm {
                git_commit: Some("deadbeef".into()),
            })
            .build()
            .unwrap();

        assert_eq!(
            request.url().query(),
            Some(format!("id={}&stageOrdinal=1&stepOrdinal=2&status=FAILURE", id).as_str())
        );
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"GIT_COMMIT=deadbeef");
    }
}
