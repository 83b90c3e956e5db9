//! Test fixtures: pipeline definitions and a started orchestrator.

use conduit_core::domain::pipeline::{Pipeline, ScmStep, Stage, Step, StepKind, TaskStep};
use conduit_core::dto::activity::{StepEvent, StepFinishEvent, StepOutcome};
use conduit_orchestrator::App;
use conduit_orchestrator::service::Coordinator;
use conduit_orchestrator::store::MemoryObjectStore;
use std::sync::Arc;
use uuid::Uuid;

use super::mocks::{MockProvider, MockScm};

pub const REPOSITORY: &str = "https://github.com/org/app.git";

/// An orchestrator on the in-memory store with mocked seams
pub struct Harness {
    pub app: App,
    pub provider: Arc<MockProvider>,
    pub scm: Arc<MockScm>,
}

#[allow(dead_code)]
impl Harness {
    pub async fn start() -> Self {
        let provider = Arc::new(MockProvider::default());
        let scm = Arc::new(MockScm::default());
        let app = App::start(
            Arc::new(MemoryObjectStore::new()),
            provider.clone(),
            scm.clone(),
            16,
        )
        .await
        .expect("orchestrator starts");
        Self { app, provider, scm }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        self.app.coordinator()
    }

    pub async fn start_step(&self, id: Uuid, stage: usize, step: usize) {
        let event = StepEvent {
            id,
            stage_ordinal: stage,
            step_ordinal: step,
        };
        self.coordinator()
            .step_started(&event)
            .await
            .expect("step start accepted");
    }

    pub async fn finish_step(&self, id: Uuid, stage: usize, step: usize, status: StepOutcome) {
        let event = StepFinishEvent {
            id,
            stage_ordinal: stage,
            step_ordinal: step,
            status,
        };
        self.coordinator()
            .step_finished(&event, None)
            .await
            .expect("step finish accepted");
    }
}

#[allow(dead_code)]
pub fn task(name: &str) -> Step {
    Step::new(
        name,
        StepKind::Task(TaskStep {
            image: "alpine:3".to_string(),
            shell_script: format!("echo {name}"),
            ..Default::default()
        }),
    )
}

/// Source stage with one checkout step, then a `test` stage with two
/// sequential task steps
#[allow(dead_code)]
pub fn two_stage_pipeline(name: &str) -> Pipeline {
    Pipeline {
        name: name.to_string(),
        is_activate: true,
        stages: vec![
            Stage {
                name: "source".to_string(),
                steps: vec![Step::new(
                    "checkout",
                    StepKind::Scm(ScmStep {
                        repository: REPOSITORY.to_string(),
                        branch: "main".to_string(),
                        webhook: true,
                        ..Default::default()
                    }),
                )],
                ..Default::default()
            },
            Stage {
                name: "test".to_string(),
                steps: vec![task("unit"), task("lint")],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

/// Same as `two_stage_pipeline` with the `test` stage gated on approval
#[allow(dead_code)]
pub fn gated_pipeline(name: &str, approvers: &[&str]) -> Pipeline {
    let mut pipeline = two_stage_pipeline(name);
    pipeline.stages[1].need_approve = true;
    pipeline.stages[1].approvers = approvers.iter().map(|a| a.to_string()).collect();
    pipeline
}

/// Source stage, then one parallel stage with `steps` task steps
#[allow(dead_code)]
pub fn parallel_pipeline(name: &str, steps: usize) -> Pipeline {
    let mut pipeline = two_stage_pipeline(name);
    pipeline.stages[1].parallel = true;
    pipeline.stages[1].steps = (0..steps).map(|i| task(&format!("shard-{i}"))).collect();
    pipeline
}
