//! Activity domain types
//!
//! An activity is one execution of a pipeline version. It embeds a deep copy of
//! the pipeline it was started from and mirrors its stages and steps with
//! runtime status, timestamps and durations (milliseconds since epoch).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, Stage, TriggerType};

pub const ENV_GIT_COMMIT: &str = "CICD_GIT_COMMIT";
pub const ENV_GIT_BRANCH: &str = "CICD_GIT_BRANCH";
pub const ENV_GIT_URL: &str = "CICD_GIT_URL";
pub const ENV_PIPELINE_NAME: &str = "CICD_PIPELINE_NAME";
pub const ENV_PIPELINE_ID: &str = "CICD_PIPELINE_ID";
pub const ENV_TRIGGER_TYPE: &str = "CICD_TRIGGER_TYPE";
pub const ENV_NODE_NAME: &str = "CICD_NODE_NAME";
pub const ENV_ACTIVITY_ID: &str = "CICD_ACTIVITY_ID";
pub const ENV_ACTIVITY_SEQUENCE: &str = "CICD_ACTIVITY_SEQUENCE";

/// Environment variable names reserved by the orchestrator
pub const PRESERVED_ENVS: [&str; 9] = [
    ENV_GIT_COMMIT,
    ENV_GIT_BRANCH,
    ENV_GIT_URL,
    ENV_PIPELINE_NAME,
    ENV_PIPELINE_ID,
    ENV_TRIGGER_TYPE,
    ENV_NODE_NAME,
    ENV_ACTIVITY_ID,
    ENV_ACTIVITY_SEQUENCE,
];

/// Execution record of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    /// Snapshot of the pipeline taken when the run started
    pub pipeline: Pipeline,
    pub run_sequence: u32,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub commit_info: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub fail_message: String,
    /// Index into `stages`, meaningful only while `status` is Pending
    #[serde(default)]
    pub pending_stage: usize,
    #[serde(default)]
    pub start_ts: i64,
    #[serde(default)]
    pub stop_ts: i64,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    pub stages: Vec<ActivityStage>,
}

impl Activity {
    /// Build a fresh run of `pipeline`.
    ///
    /// The pipeline is cloned into the activity; the run sequence follows the
    /// pipeline's run counter and the run environment is seeded from the
    /// source checkout step and the user parameters.
    pub fn new(pipeline: &Pipeline, trigger_type: TriggerType, now: i64) -> Self {
        let id = Uuid::new_v4();
        let run_sequence = pipeline.run_count + 1;

        let mut env_vars = BTreeMap::new();
        for parameter in &pipeline.parameters {
            if let Some((key, value)) = parameter.split_once('=') {
                env_vars.insert(key.trim().to_string(), value.to_string());
            }
        }
        if let Some(scm) = pipeline.scm_step() {
            env_vars.insert(ENV_GIT_URL.to_string(), scm.repository.clone());
            env_vars.insert(ENV_GIT_BRANCH.to_string(), scm.branch.clone());
        }
        env_vars.insert(ENV_PIPELINE_NAME.to_string(), pipeline.name.clone());
        env_vars.insert(ENV_PIPELINE_ID.to_string(), pipeline.id.to_string());
        env_vars.insert(ENV_TRIGGER_TYPE.to_string(), trigger_type.to_string());
        env_vars.insert(ENV_ACTIVITY_ID.to_string(), id.to_string());
        env_vars.insert(ENV_ACTIVITY_SEQUENCE.to_string(), run_sequence.to_string());

        Self {
            id,
            pipeline: pipeline.clone(),
            run_sequence,
            trigger_type,
            commit_info: String::new(),
            status: ActivityStatus::Waiting,
            fail_message: String::new(),
            pending_stage: 0,
            start_ts: now,
            stop_ts: 0,
            node_name: String::new(),
            env_vars,
            stages: pipeline.stages.iter().map(ActivityStage::from_stage).collect(),
        }
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline.id
    }

    /// Whether `user_id` may approve or deny the pending stage.
    ///
    /// Pending stages without approvers can be approved by anyone.
    pub fn can_approve(&self, user_id: &str) -> bool {
        if self.status != ActivityStatus::Pending {
            return false;
        }
        match self.stages.get(self.pending_stage) {
            Some(stage) => {
                stage.approvers.is_empty() || stage.approvers.iter().any(|a| a == user_id)
            }
            None => false,
        }
    }
}

/// Runtime mirror of a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStage {
    pub name: String,
    #[serde(default)]
    pub need_approval: bool,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub start_ts: i64,
    #[serde(default)]
    pub duration: i64,
    pub status: StageStatus,
    #[serde(default)]
    pub raw_output: String,
    pub steps: Vec<ActivityStep>,
}

impl ActivityStage {
    pub fn from_stage(stage: &Stage) -> Self {
        Self {
            name: stage.name.clone(),
            need_approval: stage.need_approve,
            approvers: stage.approvers.clone(),
            start_ts: 0,
            duration: 0,
            status: StageStatus::Waiting,
            raw_output: String::new(),
            steps: stage
                .steps
                .iter()
                .map(|step| ActivityStep {
                    name: step.name.clone(),
                    message: String::new(),
                    status: StepStatus::Waiting,
                    start_ts: 0,
                    duration: 0,
                })
                .collect(),
        }
    }
}

/// Runtime mirror of a pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStep {
    pub name: String,
    #[serde(default)]
    pub message: String,
    pub status: StepStatus,
    #[serde(default)]
    pub start_ts: i64,
    #[serde(default)]
    pub duration: i64,
}

/// Sidecar container kept alive by the provider for the steps after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiService {
    pub container_name: String,
    pub name: String,
    pub image: String,
}

/// Activity step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Waiting,
    Building,
    Success,
    Fail,
    Skipped,
    Abort,
}

/// Activity stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Waiting,
    Pending,
    Building,
    Success,
    Fail,
    Denied,
    Skipped,
    Abort,
}

/// Overall activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityStatus {
    Waiting,
    Pending,
    Building,
    Success,
    Fail,
    Denied,
    Abort,
}

impl ActivityStatus {
    /// Success, Fail, Denied and Abort end a run until it is explicitly rerun
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActivityStatus::Success
                | ActivityStatus::Fail
                | ActivityStatus::Denied
                | ActivityStatus::Abort
        )
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::Waiting => write!(f, "Waiting"),
            ActivityStatus::Pending => write!(f, "Pending"),
            ActivityStatus::Building => write!(f, "Building"),
            ActivityStatus::Success => write!(f, "Success"),
            ActivityStatus::Fail => write!(f, "Fail"),
            ActivityStatus::Denied => write!(f, "Denied"),
            ActivityStatus::Abort => write!(f, "Abort"),
        }
    }
}

/// Collect the service steps that run before `(stage_idx, step_idx)`.
///
/// Steps are scanned in document order and only those strictly before the
/// given position are considered. Container names are the activity id
/// followed by the step alias.
pub fn services_before(activity: &Activity, stage_idx: usize, step_idx: usize) -> Vec<CiService> {
    let mut services = Vec::new();
    for (i, stage) in activity.pipeline.stages.iter().enumerate().take(stage_idx + 1) {
        for (j, step) in stage.steps.iter().enumerate() {
            if i == stage_idx && j >= step_idx {
                break;
            }
            if let Some(task) = step.as_service() {
                services.push(CiService {
                    container_name: format!("{}{}", activity.id, task.alias),
                    name: task.alias.clone(),
                    image: task.image.clone(),
                });
            }
        }
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{ScmStep, Step, StepKind, TaskStep};

    fn pipeline() -> Pipeline {
        Pipeline {
            id: Uuid::new_v4(),
            name: "app".to_string(),
            run_count: 4,
            parameters: vec!["MODE=release".to_string(), "broken".to_string()],
            stages: vec![
                Stage {
                    name: "source".to_string(),
                    steps: vec![Step::new(
                        "checkout",
                        StepKind::Scm(ScmStep {
                            repository: "https://example.com/org/app.git".to_string(),
                            branch: "main".to_string(),
                            ..Default::default()
                        }),
                    )],
                    ..Default::default()
                },
                Stage {
                    name: "test".to_string(),
                    need_approve: true,
                    approvers: vec!["alice".to_string()],
                    steps: vec![
                        Step::new(
                            "db",
                            StepKind::Task(TaskStep {
                                image: "postgres:16".to_string(),
                                is_service: true,
                                alias: "db".to_string(),
                                ..Default::default()
                            }),
                        ),
                        Step::new(
                            "unit",
                            StepKind::Task(TaskStep {
                                image: "rust:1".to_string(),
                                ..Default::default()
                            }),
                        ),
                    ],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_activity_mirrors_pipeline() {
        let pipeline = pipeline();
        let activity = Activity::new(&pipeline, TriggerType::Cron, 1_000);

        assert_eq!(activity.run_sequence, 5);
        assert_eq!(activity.status, ActivityStatus::Waiting);
        assert_eq!(activity.start_ts, 1_000);
        assert_eq!(activity.stages.len(), 2);
        assert_eq!(activity.stages[1].steps.len(), 2);
        assert!(activity.stages[1].need_approval);
        assert_eq!(activity.stages[1].approvers, vec!["alice".to_string()]);
        assert!(
            activity
                .stages
                .iter()
                .flat_map(|s| &s.steps)
                .all(|s| s.status == StepStatus::Waiting)
        );

        assert_eq!(activity.env_vars.get("MODE").unwrap(), "release");
        assert_eq!(activity.env_vars.get(ENV_GIT_BRANCH).unwrap(), "main");
        assert_eq!(activity.env_vars.get(ENV_TRIGGER_TYPE).unwrap(), "cron");
        assert_eq!(activity.env_vars.get(ENV_ACTIVITY_SEQUENCE).unwrap(), "5");
        assert!(!activity.env_vars.contains_key("broken"));
    }

    #[test]
    fn test_snapshot_is_independent_of_pipeline() {
        let mut pipeline = pipeline();
        let activity = Activity::new(&pipeline, TriggerType::Manual, 0);

        pipeline.stages[0].name = "renamed".to_string();
        pipeline.stages.pop();

        assert_eq!(activity.pipeline.stages.len(), 2);
        assert_eq!(activity.pipeline.stages[0].name, "source");
    }

    #[test]
    fn test_can_approve_without_approvers() {
        let mut pipeline = pipeline();
        pipeline.stages[1].approvers.clear();
        let mut activity = Activity::new(&pipeline, TriggerType::Manual, 0);
        assert!(!activity.can_approve("anyone"));

        activity.status = ActivityStatus::Pending;
        activity.pending_stage = 1;
        assert!(activity.can_approve("anyone"));
        assert!(activity.can_approve(""));
    }

    #[test]
    fn test_can_approve_with_approvers() {
        let mut activity = Activity::new(&pipeline(), TriggerType::Manual, 0);
        activity.status = ActivityStatus::Pending;
        activity.pending_stage = 1;

        assert!(activity.can_approve("alice"));
        assert!(!activity.can_approve("bob"));

        activity.pending_stage = 7;
        assert!(!activity.can_approve("alice"));
    }

    #[test]
    fn test_services_before() {
        let activity = Activity::new(&pipeline(), TriggerType::Manual, 0);

        assert!(services_before(&activity, 1, 0).is_empty());

        let services = services_before(&activity, 1, 1);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "db");
        assert_eq!(services[0].image, "postgres:16");
        assert_eq!(services[0].container_name, format!("{}db", activity.id));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ActivityStatus::Building).unwrap(),
            "\"Building\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Skipped).unwrap(),
            "\"Skipped\""
        );
        assert!(ActivityStatus::Abort.is_terminal());
        assert!(!ActivityStatus::Pending.is_terminal());
    }
}
