//! Pipeline Service
//!
//! Validation of pipeline definitions before they are stored.

use conduit_core::domain::pipeline::{Pipeline, StepKind};
use std::collections::HashSet;

use crate::scheduler::runner::parse_spec;
use crate::service::error::{EngineError, Result};

/// Reset run bookkeeping carried by an imported or submitted definition
pub fn clean(pipeline: &mut Pipeline) {
    pipeline.status = None;
    pipeline.run_count = 0;
    pipeline.last_run_id = None;
    pipeline.last_run_status = None;
    pipeline.last_run_time = 0;
    pipeline.next_run_time = 0;
    pipeline.commit_info.clear();
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::Validation(message.into())
}

pub fn validate(pipeline: &Pipeline) -> Result<()> {
    if pipeline.name.trim().is_empty() {
        return Err(invalid("Pipeline name cannot be empty"));
    }
    if pipeline.stages.is_empty() {
        return Err(invalid("Pipeline needs at least one stage"));
    }

    let Some(scm) = pipeline.scm_step() else {
        return Err(invalid("The first step of the first stage must be an SCM step"));
    };
    if !scm.repository.ends_with(".git") {
        return Err(invalid(format!(
            "Repository '{}' must be a git URL ending in .git",
            scm.repository
        )));
    }
    if scm.branch.trim().is_empty() {
        return Err(invalid("SCM step needs a branch"));
    }

    let mut stage_names = HashSet::new();
    let mut aliases = HashSet::new();
    for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            return Err(invalid(format!("Stage {} has no name", stage_idx + 1)));
        }
        if !stage_names.insert(stage.name.as_str()) {
            return Err(invalid(format!("Duplicate stage name '{}'", stage.name)));
        }
        if stage.steps.is_empty() {
            return Err(invalid(format!("Stage '{}' has no steps", stage.name)));
        }

        for (step_idx, step) in stage.steps.iter().enumerate() {
            let position = format!("stage '{}', step {}", stage.name, step_idx + 1);
            match &step.kind {
                StepKind::Scm(_) if stage_idx != 0 || step_idx != 0 => {
                    return Err(invalid(format!("{position}: only the first step can be SCM")));
                }
                StepKind::Build(build) if build.target_image.trim().is_empty() => {
                    return Err(invalid(format!("{position}: build step needs a target image")));
                }
                StepKind::Task(task) => {
                    if task.image.trim().is_empty() {
                        return Err(invalid(format!("{position}: task step needs an image")));
                    }
                    if task.is_service {
                        if task.alias.trim().is_empty() {
                            return Err(invalid(format!("{position}: service step needs an alias")));
                        }
                        if !aliases.insert(task.alias.as_str()) {
                            return Err(invalid(format!(
                                "{position}: service alias '{}' is already used",
                                task.alias
                            )));
                        }
                    }
                }
                StepKind::UpgradeService(upgrade) => {
                    if upgrade.image_tag.trim().is_empty() {
                        return Err(invalid(format!("{position}: upgrade needs an image tag")));
                    }
                    if upgrade.service_selector.is_empty() {
                        return Err(invalid(format!("{position}: upgrade needs a service selector")));
                    }
                }
                StepKind::UpgradeStack(upgrade) if upgrade.stack_name.trim().is_empty() => {
                    return Err(invalid(format!("{position}: upgrade needs a stack name")));
                }
                StepKind::UpgradeCatalog(upgrade) if upgrade.external_id.trim().is_empty() => {
                    return Err(invalid(format!("{position}: catalog upgrade needs an external id")));
                }
                _ => {}
            }
        }
    }

    let spec = pipeline.cron_trigger.spec.trim();
    if !spec.is_empty() {
        parse_spec(spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::pipeline::{
        BuildStep, ScmStep, Stage, Step, TaskStep, UpgradeServiceStep,
    };
    use std::collections::BTreeMap;

    fn valid() -> Pipeline {
        Pipeline {
            name: "app".to_string(),
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

    fn assert_invalid(pipeline: &Pipeline) {
        assert!(
            matches!(validate(pipeline), Err(EngineError::Validation(_))),
            "expected validation error for {pipeline:?}"
        );
    }

    #[test]
    fn test_validate_valid_pipeline() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let mut pipeline = valid();
        pipeline.name = "  ".to_string();
        assert_invalid(&pipeline);
    }

    #[test]
    fn test_validate_requires_scm_first() {
        let mut pipeline = valid();
        pipeline.stages.remove(0);
        assert_invalid(&pipeline);

        let mut pipeline = valid();
        pipeline.stages.clear();
        assert_invalid(&pipeline);
    }

    #[test]
    fn test_validate_repository_url() {
        let mut pipeline = valid();
        if let StepKind::Scm(scm) = &mut pipeline.stages[0].steps[0].kind {
            scm.repository = "https://example.com/org/app".to_string();
        }
        assert_invalid(&pipeline);
    }

    #[test]
    fn test_validate_step_payloads() {
        let mut pipeline = valid();
        pipeline.stages[1]
            .steps
            .push(Step::new("image", StepKind::Build(BuildStep::default())));
        assert_invalid(&pipeline);

        let mut pipeline = valid();
        pipeline.stages[1].steps.push(Step::new(
            "upgrade",
            StepKind::UpgradeService(UpgradeServiceStep {
                image_tag: "app:2".to_string(),
                service_selector: BTreeMap::new(),
                ..Default::default()
            }),
        ));
        assert_invalid(&pipeline);
    }

    #[test]
    fn test_validate_unique_names() {
        let mut pipeline = valid();
        pipeline.stages[1].name = "source".to_string();
        assert_invalid(&pipeline);

        let mut pipeline = valid();
        let service = pipeline.stages[1].steps[0].clone();
        pipeline.stages[1].steps.push(service);
        assert_invalid(&pipeline);
    }

    #[test]
    fn test_validate_cron_spec() {
        let mut pipeline = valid();
        pipeline.cron_trigger.spec = "0 30 * * * *".to_string();
        assert!(matches!(validate(&pipeline), Err(EngineError::Scheduling(_))));

        pipeline.cron_trigger.spec = "30 * * * *".to_string();
        pipeline.cron_trigger.timezone = "Not/AZone".to_string();
        assert!(validate(&pipeline).is_ok());
    }

    #[test]
    fn test_clean_resets_bookkeeping() {
        let mut pipeline = valid();
        pipeline.run_count = 7;
        pipeline.last_run_time = 42;
        pipeline.commit_info = "abc".to_string();
        pipeline.status = Some("removed".to_string());

        clean(&mut pipeline);
        assert_eq!(pipeline.run_count, 0);
        assert_eq!(pipeline.last_run_time, 0);
        assert!(pipeline.commit_info.is_empty());
        assert!(pipeline.status.is_none());
    }
}
