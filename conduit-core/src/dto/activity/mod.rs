//! Activity DTOs
//!
//! Step callbacks sent by executors, activity views returned to API clients
//! and the payloads exchanged with a remote build executor.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::activity::{Activity, CiService};

/// Result token reported on step finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Success,
    Failure,
}

impl FromStr for StepOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(StepOutcome::Success),
            "FAILURE" => Ok(StepOutcome::Failure),
            other => Err(format!("unknown step status '{other}'")),
        }
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Success => write!(f, "SUCCESS"),
            StepOutcome::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Query of a step-start callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub id: Uuid,
    pub stage_ordinal: usize,
    pub step_ordinal: usize,
}

/// Query of a step-finish callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFinishEvent {
    pub id: Uuid,
    pub stage_ordinal: usize,
    pub step_ordinal: usize,
    pub status: StepOutcome,
}

/// Form body of a step-finish callback
///
/// Only the first step of the first stage reports the checked out commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepFinishForm {
    #[serde(rename = "GIT_COMMIT", default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

/// Activity as returned to a specific user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub can_approve: bool,
}

impl ActivityView {
    pub fn for_user(activity: Activity, user_id: Option<&str>) -> Self {
        let can_approve = user_id.is_some_and(|uid| activity.can_approve(uid));
        Self {
            activity,
            can_approve,
        }
    }
}

/// Step log paging options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepLogQuery {
    /// Only return the trailing lines
    pub tail: Option<usize>,
}

/// Step log text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub log: String,
}

/// Body sent to the executor to start a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStepRequest {
    pub activity: Activity,
    /// Sidecars started by earlier steps that this step may reach
    pub services: Vec<CiService>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_tokens() {
        assert_eq!("SUCCESS".parse::<StepOutcome>().unwrap(), StepOutcome::Success);
        assert_eq!("FAILURE".parse::<StepOutcome>().unwrap(), StepOutcome::Failure);
        assert!("success".parse::<StepOutcome>().is_err());
        assert_eq!(
            serde_json::to_string(&StepOutcome::Failure).unwrap(),
            "\"FAILURE\""
        );
    }

    #[test]
    fn test_step_finish_form_field_name() {
        let form: StepFinishForm =
            serde_json::from_str(r#"{"GIT_COMMIT": "abc123"}"#).unwrap();
        assert_eq!(form.git_commit.as_deref(), Some("abc123"));

        let empty: StepFinishForm = serde_json::from_str("{}").unwrap();
        assert!(empty.git_commit.is_none());
    }
}
