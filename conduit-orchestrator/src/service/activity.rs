//! Activity State Machine
//!
//! Pure transitions over an `Activity`. Callers hold the activity lock for
//! the whole read-modify-write and pass the current time in milliseconds,
//! which keeps every transition deterministic under test.

use conduit_core::domain::activity::{
    Activity, ActivityStage, ActivityStatus, StageStatus, StepStatus,
};

/// State machine error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    #[error("stage {0} does not exist")]
    StageOutOfRange(usize),

    #[error("step {step} of stage {stage} does not exist")]
    StepOutOfRange { stage: usize, step: usize },

    #[error("cannot {action} an activity in {status} status")]
    InvalidState {
        action: &'static str,
        status: ActivityStatus,
    },
}

pub type Result<T> = std::result::Result<T, ActivityError>;

/// Work the provider must start after a successful step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextWork {
    Stage(usize),
    Step(usize, usize),
}

fn check_step(activity: &Activity, stage: usize, step: usize) -> Result<()> {
    let Some(activity_stage) = activity.stages.get(stage) else {
        return Err(ActivityError::StageOutOfRange(stage));
    };
    if step >= activity_stage.steps.len() {
        return Err(ActivityError::StepOutOfRange { stage, step });
    }
    Ok(())
}

// =============================================================================
// Step Transitions
// =============================================================================

pub fn start_step(activity: &mut Activity, stage_idx: usize, step_idx: usize, now: i64) -> Result<()> {
    check_step(activity, stage_idx, step_idx)?;

    let stage = &mut activity.stages[stage_idx];
    let step = &mut stage.steps[step_idx];
    step.status = StepStatus::Building;
    step.start_ts = now;

    if step_idx == 0 || stage.start_ts == 0 {
        stage.start_ts = now;
    }
    if stage.status != StageStatus::Fail {
        stage.status = StageStatus::Building;
    }
    activity.status = ActivityStatus::Building;
    Ok(())
}

/// Record a successful step and advance the stage and activity.
///
/// A stage already marked Fail by a parallel sibling keeps its status.
/// When the stage completes, either the whole activity succeeds or, if
/// the next stage needs approval, the activity halts as Pending.
pub fn success_step(activity: &mut Activity, stage_idx: usize, step_idx: usize, now: i64) -> Result<()> {
    check_step(activity, stage_idx, step_idx)?;

    let stage_count = activity.stages.len();
    let stage = &mut activity.stages[stage_idx];
    let step = &mut stage.steps[step_idx];
    step.status = StepStatus::Success;
    step.duration = now - step.start_ts;

    if stage.status == StageStatus::Fail || !is_stage_success(stage) {
        return Ok(());
    }
    stage.status = StageStatus::Success;
    stage.duration = now - stage.start_ts;

    let next_idx = stage_idx + 1;
    if next_idx == stage_count {
        activity.status = ActivityStatus::Success;
        activity.stop_ts = now;
    } else if activity.stages[next_idx].need_approval {
        activity.stages[next_idx].status = StageStatus::Pending;
        activity.status = ActivityStatus::Pending;
        activity.pending_stage = next_idx;
    }
    Ok(())
}

pub fn fail_step(activity: &mut Activity, stage_idx: usize, step_idx: usize, now: i64) -> Result<()> {
    check_step(activity, stage_idx, step_idx)?;

    let stage = &mut activity.stages[stage_idx];
    let step = &mut stage.steps[step_idx];
    step.status = StepStatus::Fail;
    step.duration = now - step.start_ts;

    stage.status = StageStatus::Fail;
    stage.duration = now - stage.start_ts;

    activity.fail_message = format!("Execution fail in '{}' stage, step {}", stage.name, step_idx + 1);
    activity.status = ActivityStatus::Fail;
    activity.stop_ts = now;
    Ok(())
}

/// A stage succeeds once every step is Success or Skipped
pub fn is_stage_success(stage: &ActivityStage) -> bool {
    if matches!(stage.status, StageStatus::Fail | StageStatus::Denied) {
        return false;
    }
    stage
        .steps
        .iter()
        .all(|step| matches!(step.status, StepStatus::Success | StepStatus::Skipped))
}

/// Decide what to start after `(stage_idx, step_idx)` succeeded.
///
/// Nothing runs once the activity is terminal or waiting for approval.
/// A completed stage hands over to the next stage; inside a sequential
/// stage the following step is started; parallel stages have all their
/// steps started together by the provider.
pub fn next_work(activity: &Activity, stage_idx: usize, step_idx: usize) -> Option<NextWork> {
    if activity.status.is_terminal() || activity.status == ActivityStatus::Pending {
        return None;
    }
    let stage = activity.stages.get(stage_idx)?;

    if is_stage_success(stage) {
        return (stage_idx + 1 < activity.stages.len()).then_some(NextWork::Stage(stage_idx + 1));
    }

    let parallel = activity
        .pipeline
        .stages
        .get(stage_idx)
        .is_some_and(|s| s.parallel);
    if !parallel && step_idx + 1 < stage.steps.len() {
        return Some(NextWork::Step(stage_idx, step_idx + 1));
    }
    None
}

/// Fail the activity because the provider could not start `work`
pub fn fail_trigger(activity: &mut Activity, work: NextWork, message: String, now: i64) {
    match work {
        NextWork::Stage(stage) => {
            if let Some(stage) = activity.stages.get_mut(stage) {
                stage.status = StageStatus::Fail;
            }
        }
        NextWork::Step(stage, step) => {
            if let Some(stage) = activity.stages.get_mut(stage) {
                stage.status = StageStatus::Fail;
                if let Some(step) = stage.steps.get_mut(step) {
                    step.status = StepStatus::Fail;
                }
            }
        }
    }
    activity.fail_message = message;
    activity.status = ActivityStatus::Fail;
    activity.stop_ts = now;
}

// =============================================================================
// Activity Transitions
// =============================================================================

/// Return every stage and step to Waiting with cleared timings
pub fn reset(activity: &mut Activity) {
    for stage in &mut activity.stages {
        stage.status = StageStatus::Waiting;
        stage.start_ts = 0;
        stage.duration = 0;
        stage.raw_output.clear();
        for step in &mut stage.steps {
            step.status = StepStatus::Waiting;
            step.start_ts = 0;
            step.duration = 0;
            step.message.clear();
        }
    }
    activity.status = ActivityStatus::Waiting;
    activity.pending_stage = 0;
    activity.start_ts = 0;
    activity.stop_ts = 0;
    activity.fail_message.clear();
}

/// Index of the stage awaiting approval
pub fn ensure_pending(activity: &Activity, action: &'static str) -> Result<usize> {
    if activity.status != ActivityStatus::Pending {
        return Err(ActivityError::InvalidState {
            action,
            status: activity.status,
        });
    }
    if activity.pending_stage >= activity.stages.len() {
        return Err(ActivityError::StageOutOfRange(activity.pending_stage));
    }
    Ok(activity.pending_stage)
}

/// Resume after the provider accepted the approved stage
pub fn mark_approved(activity: &mut Activity) {
    if let Some(stage) = activity.stages.get_mut(activity.pending_stage) {
        stage.status = StageStatus::Waiting;
    }
    activity.status = ActivityStatus::Waiting;
    activity.pending_stage = 0;
}

pub fn deny(activity: &mut Activity, now: i64) -> Result<()> {
    let stage = ensure_pending(activity, "deny")?;
    activity.stages[stage].status = StageStatus::Denied;
    activity.status = ActivityStatus::Denied;
    activity.stop_ts = now;
    Ok(())
}

pub fn ensure_running(activity: &Activity) -> Result<()> {
    match activity.status {
        ActivityStatus::Building | ActivityStatus::Waiting => Ok(()),
        status => Err(ActivityError::InvalidState { action: "stop", status }),
    }
}

/// Force Abort on the activity and on the work it had not finished
pub fn abort(activity: &mut Activity, now: i64) {
    for stage in &mut activity.stages {
        if matches!(
            stage.status,
            StageStatus::Building | StageStatus::Waiting | StageStatus::Pending
        ) {
            stage.status = StageStatus::Abort;
        }
        for step in &mut stage.steps {
            if matches!(step.status, StepStatus::Building | StepStatus::Waiting) {
                step.status = StepStatus::Abort;
            }
        }
    }
    activity.status = ActivityStatus::Abort;
    activity.stop_ts = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::pipeline::{
        Pipeline, ScmStep, Stage, Step, StepKind, TaskStep, TriggerType,
    };

    fn task(name: &str) -> Step {
        Step::new(
            name,
            StepKind::Task(TaskStep {
                image: "alpine".to_string(),
                ..Default::default()
            }),
        )
    }

    fn two_stage(need_approve: bool, parallel: bool) -> Activity {
        let pipeline = Pipeline {
            name: "app".to_string(),
            stages: vec![
                Stage {
                    name: "source".to_string(),
                    steps: vec![Step::new("checkout", StepKind::Scm(ScmStep::default()))],
                    ..Default::default()
                },
                Stage {
                    name: "test".to_string(),
                    need_approve,
                    parallel,
                    steps: vec![task("unit"), task("lint")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        Activity::new(&pipeline, TriggerType::Manual, 1)
    }

    #[test]
    fn test_two_stage_run_succeeds() {
        let mut activity = two_stage(false, false);

        start_step(&mut activity, 0, 0, 10).unwrap();
        assert_eq!(activity.status, ActivityStatus::Building);
        assert_eq!(activity.stages[0].status, StageStatus::Building);
        assert_eq!(activity.stages[0].start_ts, 10);

        success_step(&mut activity, 0, 0, 20).unwrap();
        assert_eq!(activity.stages[0].status, StageStatus::Success);
        assert_eq!(activity.stages[0].duration, 10);
        assert_eq!(next_work(&activity, 0, 0), Some(NextWork::Stage(1)));

        start_step(&mut activity, 1, 0, 30).unwrap();
        success_step(&mut activity, 1, 0, 40).unwrap();
        assert_eq!(activity.stages[1].status, StageStatus::Building);
        assert_eq!(next_work(&activity, 1, 0), Some(NextWork::Step(1, 1)));

        start_step(&mut activity, 1, 1, 50).unwrap();
        success_step(&mut activity, 1, 1, 65).unwrap();

        assert_eq!(activity.status, ActivityStatus::Success);
        assert_eq!(activity.stop_ts, 65);
        assert!(activity.stages.iter().all(|s| s.status == StageStatus::Success));
        assert_eq!(activity.stages[1].duration, 35);
        assert_eq!(activity.stages[1].steps[1].duration, 15);
        assert_eq!(next_work(&activity, 1, 1), None);
    }

    #[test]
    fn test_approval_halts_before_next_stage() {
        let mut activity = two_stage(true, false);

        start_step(&mut activity, 0, 0, 10).unwrap();
        success_step(&mut activity, 0, 0, 20).unwrap();

        assert_eq!(activity.status, ActivityStatus::Pending);
        assert_eq!(activity.pending_stage, 1);
        assert_eq!(activity.stages[1].status, StageStatus::Pending);
        assert!(
            activity.stages[1]
                .steps
                .iter()
                .all(|s| s.status == StepStatus::Waiting)
        );
        assert_eq!(next_work(&activity, 0, 0), None);
        assert_eq!(ensure_pending(&activity, "approve"), Ok(1));

        mark_approved(&mut activity);
        assert_eq!(activity.status, ActivityStatus::Waiting);
        assert_eq!(activity.pending_stage, 0);
        assert_eq!(activity.stages[1].status, StageStatus::Waiting);
        assert_eq!(activity.stages[0].status, StageStatus::Success);
    }

    #[test]
    fn test_single_step_failure() {
        let pipeline = Pipeline {
            stages: vec![Stage {
                name: "build".to_string(),
                steps: vec![task("compile")],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut activity = Activity::new(&pipeline, TriggerType::Manual, 1);

        start_step(&mut activity, 0, 0, 5).unwrap();
        fail_step(&mut activity, 0, 0, 9).unwrap();

        assert_eq!(activity.status, ActivityStatus::Fail);
        assert_eq!(activity.stages[0].status, StageStatus::Fail);
        assert_eq!(activity.stages[0].steps[0].duration, 4);
        assert!(activity.fail_message.contains("build"));
        assert!(activity.fail_message.contains("step 1"));
        assert!(activity.stop_ts > 0);
    }

    #[test]
    fn test_stage_failure_is_sticky() {
        let mut activity = two_stage(false, true);
        start_step(&mut activity, 0, 0, 1).unwrap();
        success_step(&mut activity, 0, 0, 2).unwrap();

        start_step(&mut activity, 1, 0, 3).unwrap();
        start_step(&mut activity, 1, 1, 3).unwrap();
        fail_step(&mut activity, 1, 1, 4).unwrap();
        success_step(&mut activity, 1, 0, 5).unwrap();

        assert_eq!(activity.stages[1].status, StageStatus::Fail);
        assert_eq!(activity.stages[1].steps[0].status, StepStatus::Success);
        assert_eq!(activity.status, ActivityStatus::Fail);
        assert_eq!(next_work(&activity, 1, 0), None);
    }

    #[test]
    fn test_is_stage_success() {
        let mut activity = two_stage(false, false);
        let stage = &mut activity.stages[1];
        assert!(!is_stage_success(stage));

        stage.steps[0].status = StepStatus::Success;
        assert!(!is_stage_success(stage));

        stage.steps[1].status = StepStatus::Skipped;
        assert!(is_stage_success(stage));

        stage.steps[1].status = StepStatus::Fail;
        assert!(!is_stage_success(stage));
    }

    #[test]
    fn test_sequential_steps_start_in_order() {
        let pipeline = Pipeline {
            stages: vec![Stage {
                name: "steps".to_string(),
                steps: (0..4).map(|i| task(&format!("step-{i}"))).collect(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut activity = Activity::new(&pipeline, TriggerType::Manual, 1);

        let mut started = Vec::new();
        let mut current = Some(NextWork::Step(0, 0));
        let mut now = 1;
        while let Some(NextWork::Step(stage, step)) = current {
            // Nothing after the running step has started yet
            assert!(
                activity.stages[0].steps[step..]
                    .iter()
                    .all(|s| s.status == StepStatus::Waiting)
            );
            start_step(&mut activity, stage, step, now).unwrap();
            started.push(step);
            now += 1;
            success_step(&mut activity, stage, step, now).unwrap();
            current = next_work(&activity, stage, step);
        }

        assert_eq!(started, vec![0, 1, 2, 3]);
        assert_eq!(activity.status, ActivityStatus::Success);
    }

    #[test]
    fn test_parallel_stage_triggers_nothing_per_step() {
        let mut activity = two_stage(false, true);
        start_step(&mut activity, 1, 0, 1).unwrap();
        start_step(&mut activity, 1, 1, 1).unwrap();
        success_step(&mut activity, 1, 0, 2).unwrap();

        assert_eq!(next_work(&activity, 1, 0), None);
    }

    #[test]
    fn test_reset_clears_run_state() {
        let mut activity = two_stage(true, false);
        start_step(&mut activity, 0, 0, 10).unwrap();
        success_step(&mut activity, 0, 0, 20).unwrap();
        deny(&mut activity, 30).unwrap();

        reset(&mut activity);

        assert_eq!(activity.status, ActivityStatus::Waiting);
        assert_eq!(activity.pending_stage, 0);
        assert_eq!(activity.start_ts, 0);
        assert_eq!(activity.stop_ts, 0);
        assert!(activity.fail_message.is_empty());
        for stage in &activity.stages {
            assert_eq!(stage.status, StageStatus::Waiting);
            assert_eq!(stage.start_ts, 0);
            assert_eq!(stage.duration, 0);
            for step in &stage.steps {
                assert_eq!(step.status, StepStatus::Waiting);
                assert_eq!(step.duration, 0);
            }
        }
    }

    #[test]
    fn test_rejected_approval_leaves_activity_untouched() {
        let mut activity = two_stage(true, false);
        start_step(&mut activity, 0, 0, 10).unwrap();
        let snapshot = activity.clone();

        let result = ensure_pending(&activity, "approve");
        assert_eq!(
            result,
            Err(ActivityError::InvalidState {
                action: "approve",
                status: ActivityStatus::Building
            })
        );
        assert!(deny(&mut activity, 99).is_err());
        assert_eq!(activity, snapshot);
    }

    #[test]
    fn test_deny_is_terminal() {
        let mut activity = two_stage(true, false);
        start_step(&mut activity, 0, 0, 10).unwrap();
        success_step(&mut activity, 0, 0, 20).unwrap();

        deny(&mut activity, 25).unwrap();
        assert_eq!(activity.status, ActivityStatus::Denied);
        assert_eq!(activity.stages[1].status, StageStatus::Denied);
        assert_eq!(activity.stop_ts, 25);
        assert_eq!(next_work(&activity, 0, 0), None);
    }

    #[test]
    fn test_abort_marks_unfinished_work() {
        let mut activity = two_stage(false, false);
        start_step(&mut activity, 0, 0, 10).unwrap();
        success_step(&mut activity, 0, 0, 20).unwrap();
        start_step(&mut activity, 1, 0, 30).unwrap();
        assert!(ensure_running(&activity).is_ok());

        abort(&mut activity, 40);

        assert_eq!(activity.status, ActivityStatus::Abort);
        assert_eq!(activity.stop_ts, 40);
        assert_eq!(activity.stages[0].status, StageStatus::Success);
        assert_eq!(activity.stages[0].steps[0].status, StepStatus::Success);
        assert_eq!(activity.stages[1].status, StageStatus::Abort);
        assert!(
            activity.stages[1]
                .steps
                .iter()
                .all(|s| s.status == StepStatus::Abort)
        );
        assert!(ensure_running(&activity).is_err());
    }

    #[test]
    fn test_fail_trigger() {
        let mut activity = two_stage(false, false);
        start_step(&mut activity, 1, 0, 10).unwrap();
        success_step(&mut activity, 1, 0, 20).unwrap();

        fail_trigger(&mut activity, NextWork::Step(1, 1), "executor down".to_string(), 21);

        assert_eq!(activity.status, ActivityStatus::Fail);
        assert_eq!(activity.stages[1].status, StageStatus::Fail);
        assert_eq!(activity.stages[1].steps[1].status, StepStatus::Fail);
        assert_eq!(activity.fail_message, "executor down");
        assert_eq!(activity.stop_ts, 21);
    }

    #[test]
    fn test_out_of_range_indexes() {
        let mut activity = two_stage(false, false);
        assert_eq!(
            start_step(&mut activity, 5, 0, 1),
            Err(ActivityError::StageOutOfRange(5))
        );
        assert_eq!(
            success_step(&mut activity, 1, 2, 1),
            Err(ActivityError::StepOutOfRange { stage: 1, step: 2 })
        );
    }
}
