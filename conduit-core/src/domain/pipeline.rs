//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::activity::ActivityStatus;

/// Pipeline definition
///
/// The definition is copied into every activity at run start, so edits made
/// afterwards never reach run history. Bookkeeping fields (`run_count`,
/// `last_run_*`, `next_run_time`, `commit_info`) are denormalized for display
/// and are rewritten by the orchestrator on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub is_activate: bool,
    /// Set to `removed` on the change broadcast after deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub run_count: u32,
    pub last_run_id: Option<Uuid>,
    pub last_run_status: Option<ActivityStatus>,
    /// Milliseconds since epoch, 0 when never run
    pub last_run_time: i64,
    /// Milliseconds since epoch, 0 when not scheduled
    pub next_run_time: i64,
    pub commit_info: String,
    pub webhook_token: String,
    /// User defined environment variables in `KEY=VALUE` form
    pub parameters: Vec<String>,
    pub cron_trigger: CronTrigger,
    pub stages: Vec<Stage>,
    pub keep_workspace: bool,
}

impl Pipeline {
    /// The source checkout step anchoring credentials and webhooks.
    ///
    /// Returns `None` when the first step of the first stage is not SCM,
    /// which validation rejects.
    pub fn scm_step(&self) -> Option<&ScmStep> {
        match self.stages.first()?.steps.first()?.kind {
            StepKind::Scm(ref scm) => Some(scm),
            _ => None,
        }
    }

    /// Whether the cron trigger should have a live runner
    pub fn is_scheduled(&self) -> bool {
        self.is_activate && !self.cron_trigger.spec.trim().is_empty()
    }
}

/// Cron trigger settings of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronTrigger {
    /// Only start a run when the branch head moved since the last run
    pub trigger_on_update: bool,
    /// Standard 5-field cron expression, empty when unscheduled
    pub spec: String,
    /// IANA timezone name, falls back to local time when unresolvable
    pub timezone: String,
}

/// An ordered phase of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage {
    pub name: String,
    pub need_approve: bool,
    pub parallel: bool,
    pub approvers: Vec<String>,
    pub steps: Vec<Step>,
}

/// A single typed unit of work within a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub name: String,
    /// Step timeout in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            kind,
        }
    }

    /// Wire name of the step type
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            StepKind::Scm(_) => "scm",
            StepKind::Build(_) => "build",
            StepKind::Task(_) => "task",
            StepKind::Deploy(_) => "deploy",
            StepKind::UpgradeService(_) => "upgradeService",
            StepKind::UpgradeStack(_) => "upgradeStack",
            StepKind::UpgradeCatalog(_) => "upgradeCatalog",
        }
    }

    /// Task steps flagged as long-running services for the steps after them
    pub fn as_service(&self) -> Option<&TaskStep> {
        match self.kind {
            StepKind::Task(ref task) if task.is_service => Some(task),
            _ => None,
        }
    }
}

/// Type-specific step payload, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    Scm(ScmStep),
    Build(BuildStep),
    Task(TaskStep),
    Deploy(DeployStep),
    UpgradeService(UpgradeServiceStep),
    UpgradeStack(UpgradeStackStep),
    UpgradeCatalog(UpgradeCatalogStep),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScmStep {
    pub repository: String,
    pub branch: String,
    /// Id of the git account whose token is used to reach the repository
    pub git_user: String,
    pub webhook: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildStep {
    pub dockerfile_content: String,
    pub build_path: String,
    pub dockerfile_path: String,
    pub target_image: String,
    pub push: bool,
    pub registry_username: String,
    pub registry_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStep {
    pub image: String,
    pub is_service: bool,
    pub alias: String,
    pub shell_script: String,
    pub entrypoint: String,
    pub args: String,
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployStep {
    pub deploy_name: String,
    pub image: String,
    pub count: u32,
    #[serde(flatten)]
    pub target: TargetEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpgradeServiceStep {
    pub image_tag: String,
    pub service_selector: BTreeMap<String, String>,
    pub batch_size: u32,
    /// Seconds between upgrade batches
    pub interval: u32,
    pub start_first: bool,
    #[serde(flatten)]
    pub target: TargetEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpgradeStackStep {
    pub stack_name: String,
    pub docker_compose: String,
    pub rancher_compose: String,
    #[serde(flatten)]
    pub target: TargetEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpgradeCatalogStep {
    pub external_id: String,
    pub stack_name: String,
    pub deploy: bool,
    pub templates: BTreeMap<String, String>,
    pub answers: String,
    #[serde(flatten)]
    pub target: TargetEndpoint,
}

/// Environment API endpoint and keys used by deploy and upgrade steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetEndpoint {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Origin of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    #[default]
    Manual,
    Webhook,
    Cron,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Manual => write!(f, "manual"),
            TriggerType::Webhook => write!(f, "webhook"),
            TriggerType::Cron => write!(f, "cron"),
        }
    }
}
