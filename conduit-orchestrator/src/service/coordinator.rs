//! Run Coordinator
//!
//! Translates manual, webhook and cron triggers and executor callbacks into
//! provider calls and state machine transitions. Every activity mutation
//! runs under that activity's lock from the store read until the write;
//! pipeline bookkeeping follows afterwards on a best-effort basis.

use async_trait::async_trait;
use chrono::Utc;
use conduit_core::domain::account::{GitAccount, auth_repo_url};
use conduit_core::domain::activity::{
    Activity, ActivityStatus, CiService, ENV_GIT_COMMIT, services_before,
};
use conduit_core::domain::pipeline::{Pipeline, TriggerType};
use conduit_core::dto::account::CreateAccount;
use conduit_core::dto::activity::{StepEvent, StepFinishEvent, StepLogQuery, StepOutcome};
use conduit_core::dto::event::ChangeMessage;
use std::sync::Arc;
use uuid::Uuid;

use crate::hub::Hub;
use crate::locks::ActivityLocks;
use crate::provider::{PipelineProvider, ProviderError};
use crate::repository::{account_repository, activity_repository, pipeline_repository};
use crate::scheduler::{FireHandler, SchedulerHandle, next_run_time};
use crate::scm::{SourceControl, WebhookRequest};
use crate::service::activity::{self as machine, NextWork};
use crate::service::error::{EngineError, Result};
use crate::service::pipeline as pipeline_service;
use crate::store::ObjectStore;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct Coordinator {
    store: Arc<dyn ObjectStore>,
    provider: Arc<dyn PipelineProvider>,
    scm: Arc<dyn SourceControl>,
    locks: ActivityLocks,
    hub: Hub,
    scheduler: SchedulerHandle,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn PipelineProvider>,
        scm: Arc<dyn SourceControl>,
        hub: Hub,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            store,
            provider,
            scm,
            locks: ActivityLocks::new(),
            hub,
            scheduler,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn locks(&self) -> &ActivityLocks {
        &self.locks
    }

    async fn load_activity(&self, id: Uuid) -> Result<Activity> {
        activity_repository::find_by_id(self.store(), id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Activity {id}")))
    }

    async fn save_activity(&self, activity: &Activity) -> Result<()> {
        activity_repository::update(self.store(), activity).await?;
        self.hub.publish(ChangeMessage::activity(activity));
        Ok(())
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        pipeline_repository::update(self.store(), pipeline).await?;
        self.hub.publish(ChangeMessage::pipeline(pipeline));
        Ok(())
    }

    // =============================================================================
    // Pipelines
    // =============================================================================

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        Ok(pipeline_repository::list_all(self.store()).await?)
    }

    pub async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        pipeline_repository::find_by_id(self.store(), id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Pipeline {id}")))
    }

    pub async fn create_pipeline(&self, mut pipeline: Pipeline) -> Result<Pipeline> {
        pipeline_service::clean(&mut pipeline);
        pipeline_service::validate(&pipeline)?;

        pipeline.id = Uuid::new_v4();
        pipeline.webhook_token = Uuid::new_v4().simple().to_string();
        pipeline.next_run_time = next_run_time(&pipeline);

        pipeline_repository::create(self.store(), &pipeline).await?;
        self.scheduler.sync_pipeline(&pipeline);
        self.hub.publish(ChangeMessage::pipeline(&pipeline));

        tracing::info!("Pipeline created: {} ({})", pipeline.name, pipeline.id);
        Ok(pipeline)
    }

    /// Replace the definition of a pipeline, keeping its run bookkeeping
    pub async fn update_pipeline(&self, id: Uuid, mut pipeline: Pipeline) -> Result<Pipeline> {
        let existing = self.get_pipeline(id).await?;
        pipeline_service::validate(&pipeline)?;

        pipeline.id = id;
        pipeline.status = None;
        pipeline.run_count = existing.run_count;
        pipeline.last_run_id = existing.last_run_id;
        pipeline.last_run_status = existing.last_run_status;
        pipeline.last_run_time = existing.last_run_time;
        pipeline.commit_info = existing.commit_info;
        if pipeline.webhook_token.is_empty() {
            pipeline.webhook_token = existing.webhook_token;
        }
        pipeline.next_run_time = next_run_time(&pipeline);

        self.save_pipeline(&pipeline).await?;
        self.scheduler.sync_pipeline(&pipeline);

        tracing::info!("Pipeline updated: {} ({})", pipeline.name, pipeline.id);
        Ok(pipeline)
    }

    pub async fn delete_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        let mut pipeline = self.get_pipeline(id).await?;
        pipeline_repository::delete(self.store(), id).await?;
        self.scheduler.unregister(id);

        pipeline.status = Some("removed".to_string());
        self.hub.publish(ChangeMessage::pipeline(&pipeline));

        tracing::info!("Pipeline deleted: {}", id);
        Ok(pipeline)
    }

    pub async fn activate_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        self.set_activation(id, true).await
    }

    pub async fn deactivate_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        self.set_activation(id, false).await
    }

    async fn set_activation(&self, id: Uuid, active: bool) -> Result<Pipeline> {
        let mut pipeline = self.get_pipeline(id).await?;
        pipeline.is_activate = active;
        pipeline.next_run_time = next_run_time(&pipeline);

        self.save_pipeline(&pipeline).await?;
        self.scheduler.sync_pipeline(&pipeline);
        Ok(pipeline)
    }

    /// Start a new run of the pipeline.
    ///
    /// The activity is persisted before the provider is asked to execute it
    /// and its lock is held until the provider answered, so early step
    /// callbacks always find the record. Overlapping runs of one pipeline
    /// are allowed.
    pub async fn run_pipeline(&self, pipeline_id: Uuid, trigger_type: TriggerType) -> Result<Activity> {
        let pipeline = self.get_pipeline(pipeline_id).await?;
        let mut activity = Activity::new(&pipeline, trigger_type, now_ms());

        let guard = self.locks.lock(activity.id).await;
        activity_repository::create(self.store(), &activity).await?;

        if let Err(e) = self.provider.run_pipeline(&mut activity).await {
            tracing::error!("Provider failed to start activity {}: {}", activity.id, e);
            if let Err(e) = activity_repository::delete(self.store(), activity.id).await {
                tracing::warn!("Failed to remove unstarted activity {}: {}", activity.id, e);
            }
            drop(guard);
            self.locks.forget(activity.id);
            return Err(e.into());
        }
        self.save_activity(&activity).await?;
        drop(guard);

        // Re-read so concurrent runs do not overwrite each other's counters
        let mut pipeline = self.get_pipeline(pipeline_id).await?;
        pipeline.run_count += 1;
        pipeline.last_run_id = Some(activity.id);
        pipeline.last_run_status = Some(activity.status);
        pipeline.last_run_time = activity.start_ts;
        pipeline.next_run_time = next_run_time(&pipeline);
        self.save_pipeline(&pipeline).await?;

        tracing::info!(
            "Pipeline {} run #{} started ({}) as activity {}",
            pipeline.name,
            activity.run_sequence,
            trigger_type,
            activity.id
        );
        Ok(activity)
    }

    /// Run a pipeline from a verified push webhook.
    ///
    /// Returns `None` for GitHub ping events, which only check connectivity.
    pub async fn trigger_webhook(&self, pipeline_id: Uuid, request: WebhookRequest) -> Result<Option<Activity>> {
        if request.is_ping() {
            tracing::debug!("Webhook ping for pipeline {}", pipeline_id);
            return Ok(None);
        }

        let pipeline = self.get_pipeline(pipeline_id).await?;
        if !pipeline.is_activate {
            return Err(EngineError::InvalidState(format!(
                "Pipeline {} is not activated",
                pipeline_id
            )));
        }
        if !self.scm.verify_webhook_payload(&pipeline, &request) {
            return Err(EngineError::Forbidden("Webhook verification failed".to_string()));
        }

        let activity = self.run_pipeline(pipeline_id, TriggerType::Webhook).await?;
        Ok(Some(activity))
    }

    async fn cron_fire(&self, pipeline_id: Uuid) -> Result<()> {
        let mut pipeline = self.get_pipeline(pipeline_id).await?;
        if !pipeline.is_activate {
            tracing::debug!("Pipeline {} is no longer active, skipping cron fire", pipeline_id);
            return Ok(());
        }

        if pipeline.cron_trigger.trigger_on_update {
            let scm = pipeline.scm_step().ok_or_else(|| {
                EngineError::Validation(format!("Pipeline {pipeline_id} has no SCM step"))
            })?;

            let repo_url = if scm.git_user.is_empty() {
                scm.repository.clone()
            } else {
                let account = account_repository::find_by_id(self.store(), &scm.git_user)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("Git account {}", scm.git_user)))?;
                auth_repo_url(&scm.repository, &account)
            };

            let head = self.scm.head_commit(&repo_url, &scm.branch).await?;
            if head == pipeline.commit_info {
                tracing::debug!("Pipeline {} has no new commit, skipping run", pipeline_id);
                pipeline.next_run_time = next_run_time(&pipeline);
                return self.save_pipeline(&pipeline).await;
            }
        }

        self.run_pipeline(pipeline_id, TriggerType::Cron).await?;
        Ok(())
    }

    // =============================================================================
    // Activities
    // =============================================================================

    /// All activities, those awaiting approval first, then newest first
    pub async fn list_activities(&self) -> Result<Vec<Activity>> {
        let mut activities = activity_repository::list_all(self.store()).await?;
        activities.sort_by_key(|a| a.status != ActivityStatus::Pending);
        Ok(activities)
    }

    pub async fn list_pipeline_activities(&self, pipeline_id: Uuid) -> Result<Vec<Activity>> {
        Ok(activity_repository::find_by_pipeline(self.store(), pipeline_id).await?)
    }

    pub async fn get_activity(&self, id: Uuid) -> Result<Activity> {
        self.load_activity(id).await
    }

    pub async fn delete_activity(&self, id: Uuid) -> Result<()> {
        let guard = self.locks.lock(id).await;
        let activity = self.load_activity(id).await?;

        if machine::ensure_running(&activity).is_ok() {
            if let Err(e) = self.provider.stop_activity(&activity).await {
                tracing::warn!("Failed to stop activity {} before deletion: {}", id, e);
            }
        }
        activity_repository::delete(self.store(), id).await?;
        drop(guard);
        self.locks.forget(id);

        tracing::info!("Activity deleted: {}", id);
        Ok(())
    }

    fn check_approver(activity: &Activity, user_id: Option<&str>) -> Result<()> {
        match user_id {
            Some(user) if !activity.can_approve(user) => Err(EngineError::Forbidden(format!(
                "User {} cannot approve activity {}",
                user, activity.id
            ))),
            _ => Ok(()),
        }
    }

    pub async fn approve(&self, id: Uuid, user_id: Option<&str>) -> Result<Activity> {
        let guard = self.locks.lock(id).await;
        let mut activity = self.load_activity(id).await?;

        let stage = machine::ensure_pending(&activity, "approve")?;
        Self::check_approver(&activity, user_id)?;

        self.provider.run_stage(&activity, stage).await?;
        machine::mark_approved(&mut activity);
        self.save_activity(&activity).await?;
        drop(guard);

        tracing::info!("Activity {} stage {} approved", id, stage);
        self.update_last_activity(&activity).await;
        Ok(activity)
    }

    pub async fn deny(&self, id: Uuid, user_id: Option<&str>) -> Result<Activity> {
        let guard = self.locks.lock(id).await;
        let mut activity = self.load_activity(id).await?;

        machine::ensure_pending(&activity, "deny")?;
        Self::check_approver(&activity, user_id)?;

        machine::deny(&mut activity, now_ms())?;
        self.save_activity(&activity).await?;
        drop(guard);

        tracing::info!("Activity {} denied", id);
        self.update_last_activity(&activity).await;
        Ok(activity)
    }

    /// Halt a running activity and mark it aborted
    pub async fn stop(&self, id: Uuid) -> Result<Activity> {
        let guard = self.locks.lock(id).await;
        let mut activity = self.load_activity(id).await?;

        machine::ensure_running(&activity)?;
        self.provider.stop_activity(&activity).await?;
        machine::abort(&mut activity, now_ms());
        self.save_activity(&activity).await?;
        drop(guard);

        tracing::info!("Activity {} stopped", id);
        self.update_last_activity(&activity).await;
        Ok(activity)
    }

    /// Run a finished activity again from its first stage
    pub async fn rerun(&self, id: Uuid) -> Result<Activity> {
        let guard = self.locks.lock(id).await;
        let mut activity = self.load_activity(id).await?;

        if !activity.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "cannot rerun an activity in {} status",
                activity.status
            )));
        }

        self.reset_activity(&mut activity).await?;
        activity.start_ts = now_ms();
        self.provider.rerun_activity(&mut activity).await?;
        self.save_activity(&activity).await?;
        drop(guard);

        tracing::info!("Activity {} rerun", id);
        self.update_last_activity(&activity).await;
        Ok(activity)
    }

    async fn reset_activity(&self, activity: &mut Activity) -> Result<()> {
        self.provider.delete_former_build(activity).await?;
        machine::reset(activity);
        Ok(())
    }

    /// Executor callback: a step began running
    pub async fn step_started(&self, event: &StepEvent) -> Result<Activity> {
        let guard = self.locks.lock(event.id).await;
        let mut activity = self.load_activity(event.id).await?;

        if activity.status.is_terminal() {
            tracing::warn!(
                "Ignoring start of step {}/{} for {} activity {}",
                event.stage_ordinal,
                event.step_ordinal,
                activity.status,
                activity.id
            );
            return Ok(activity);
        }

        machine::start_step(&mut activity, event.stage_ordinal, event.step_ordinal, now_ms())?;
        self.save_activity(&activity).await?;
        drop(guard);

        tracing::debug!(
            "Activity {} step {}/{} started",
            activity.id,
            event.stage_ordinal,
            event.step_ordinal
        );
        self.update_last_activity(&activity).await;
        Ok(activity)
    }

    /// Executor callback: a step finished.
    ///
    /// The first step reports the checked out commit, which is recorded on
    /// the activity before anything else starts. A success triggers the
    /// next unit of work; if the provider cannot start it the activity
    /// fails, is persisted, and the provider error is returned.
    pub async fn step_finished(&self, event: &StepFinishEvent, git_commit: Option<String>) -> Result<Activity> {
        let (stage, step) = (event.stage_ordinal, event.step_ordinal);
        let guard = self.locks.lock(event.id).await;
        let mut activity = self.load_activity(event.id).await?;

        if activity.status.is_terminal() {
            tracing::warn!(
                "Ignoring finish of step {}/{} for {} activity {}",
                stage,
                step,
                activity.status,
                activity.id
            );
            return Ok(activity);
        }

        if stage == 0 && step == 0 {
            if let Some(commit) = git_commit.filter(|c| !c.is_empty()) {
                activity.env_vars.insert(ENV_GIT_COMMIT.to_string(), commit.clone());
                activity.commit_info = commit;
            }
        }

        let mut trigger_error = None;
        match event.status {
            StepOutcome::Success => {
                machine::success_step(&mut activity, stage, step, now_ms())?;
                trigger_error = self.trigger_next(&mut activity, stage, step).await.err();
            }
            StepOutcome::Failure => machine::fail_step(&mut activity, stage, step, now_ms())?,
        }

        self.save_activity(&activity).await?;
        drop(guard);

        tracing::debug!(
            "Activity {} step {}/{} finished: {}",
            activity.id,
            stage,
            step,
            event.status
        );
        self.update_last_activity(&activity).await;
        if matches!(activity.status, ActivityStatus::Success | ActivityStatus::Fail) {
            tracing::info!("Activity {} finished: {}", activity.id, activity.status);
            self.provider.on_activity_complete(&activity).await;
        }

        match trigger_error {
            Some(e) => Err(e.into()),
            None => Ok(activity),
        }
    }

    async fn trigger_next(&self, activity: &mut Activity, stage: usize, step: usize) -> std::result::Result<(), ProviderError> {
        let Some(work) = machine::next_work(activity, stage, step) else {
            return Ok(());
        };

        let result = match work {
            NextWork::Stage(next) => self.provider.run_stage(activity, next).await,
            NextWork::Step(stage, next) => self.provider.run_step(activity, stage, next).await,
        };
        if let Err(e) = result {
            tracing::error!("Failed to start {:?} of activity {}: {}", work, activity.id, e);
            let message = match work {
                NextWork::Stage(next) => format!("Failed to start stage {}: {}", next + 1, e),
                NextWork::Step(stage, next) => {
                    format!("Failed to start step {} of stage {}: {}", next + 1, stage + 1, e)
                }
            };
            machine::fail_trigger(activity, work, message, now_ms());
            return Err(e);
        }
        Ok(())
    }

    /// Mirror the activity onto its pipeline when it is the latest run
    pub async fn update_last_activity(&self, activity: &Activity) {
        let mut pipeline = match pipeline_repository::find_by_id(self.store(), activity.pipeline_id()).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to load pipeline of activity {}: {}", activity.id, e);
                return;
            }
        };
        if pipeline.last_run_id != Some(activity.id) {
            return;
        }

        pipeline.last_run_status = Some(activity.status);
        pipeline.commit_info = activity.commit_info.clone();
        pipeline.next_run_time = next_run_time(&pipeline);
        if let Err(e) = self.save_pipeline(&pipeline).await {
            tracing::warn!("Failed to update last run of pipeline {}: {}", pipeline.id, e);
        }
    }

    /// Sidecar services a step can reach
    pub async fn get_services(&self, id: Uuid, stage: usize, step: usize) -> Result<Vec<CiService>> {
        let activity = self.load_activity(id).await?;
        if stage >= activity.stages.len() {
            return Err(EngineError::Validation(format!("stage {stage} does not exist")));
        }
        Ok(services_before(&activity, stage, step))
    }

    pub async fn get_step_log(&self, id: Uuid, stage: usize, step: usize, query: &StepLogQuery) -> Result<String> {
        let activity = self.load_activity(id).await?;
        let in_range = activity
            .stages
            .get(stage)
            .is_some_and(|s| step < s.steps.len());
        if !in_range {
            return Err(EngineError::Validation(format!(
                "step {step} of stage {stage} does not exist"
            )));
        }
        Ok(self.provider.get_step_log(&activity, stage, step, query).await?)
    }

    /// Refresh every unfinished activity from the provider. Returns how many
    /// were synced.
    pub async fn sync_in_flight(&self) -> Result<usize> {
        let activities = activity_repository::list_all(self.store()).await?;
        let mut synced = 0;

        for activity in activities.into_iter().filter(|a| !a.status.is_terminal()) {
            let _guard = self.locks.lock(activity.id).await;
            let mut activity = match self.load_activity(activity.id).await {
                Ok(activity) => activity,
                Err(e) => {
                    tracing::warn!("Failed to reload activity {}: {}", activity.id, e);
                    continue;
                }
            };
            if let Err(e) = self.provider.sync_activity(&mut activity).await {
                tracing::error!("Failed to sync activity {}: {}", activity.id, e);
                continue;
            }
            if let Err(e) = self.save_activity(&activity).await {
                tracing::error!("Failed to persist synced activity {}: {}", activity.id, e);
                continue;
            }
            synced += 1;
        }

        tracing::info!("Synced {} in-flight activities", synced);
        Ok(synced)
    }

    /// Delete every pipeline, activity and account
    pub async fn reset(&self) -> Result<()> {
        for pipeline in pipeline_repository::list_all(self.store()).await? {
            self.scheduler.unregister(pipeline.id);
            pipeline_repository::delete(self.store(), pipeline.id).await?;
        }
        for activity in activity_repository::list_all(self.store()).await? {
            activity_repository::delete(self.store(), activity.id).await?;
        }
        for account in account_repository::list_all(self.store()).await? {
            account_repository::delete(self.store(), &account.id).await?;
        }
        self.locks.clear();

        tracing::info!("All pipelines, activities and accounts removed");
        Ok(())
    }

    // =============================================================================
    // Accounts
    // =============================================================================

    pub async fn create_account(&self, req: CreateAccount, owner_id: &str) -> Result<GitAccount> {
        if req.login.trim().is_empty() {
            return Err(EngineError::Validation("Account login cannot be empty".to_string()));
        }
        let account = req.into_account(owner_id);
        account_repository::create(self.store(), &account).await?;
        self.hub.publish(ChangeMessage::account(&account));

        tracing::info!("Git account created: {}", account.id);
        Ok(account.redacted())
    }

    pub async fn list_accounts(&self) -> Result<Vec<GitAccount>> {
        let accounts = account_repository::list_all(self.store()).await?;
        Ok(accounts.iter().map(GitAccount::redacted).collect())
    }

    pub async fn delete_account(&self, id: &str) -> Result<()> {
        if !account_repository::delete(self.store(), id).await? {
            return Err(EngineError::NotFound(format!("Git account {id}")));
        }
        tracing::info!("Git account deleted: {}", id);
        Ok(())
    }
}

#[async_trait]
impl FireHandler for Coordinator {
    async fn fire(&self, pipeline_id: Uuid) {
        tracing::debug!("Cron fired for pipeline {}", pipeline_id);
        if let Err(e) = self.cron_fire(pipeline_id).await {
            tracing::error!("Cron run of pipeline {} abandoned: {}", pipeline_id, e);
        }
    }
}
