//! Change notification DTOs
//!
//! Messages published to live status subscribers whenever a pipeline,
//! activity or git account is written.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::account::GitAccount;
use crate::domain::activity::Activity;
use crate::domain::pipeline::Pipeline;

pub const RESOURCE_CHANGE: &str = "resource.change";

/// Kind of resource carried by a change message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Activity,
    Pipeline,
    GitAccount,
}

/// A single change broadcast to every subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    pub id: Uuid,
    pub name: String,
    pub resource_type: ResourceType,
    /// Milliseconds since epoch
    pub time: i64,
    pub data: serde_json::Value,
}

impl ChangeMessage {
    fn new(resource_type: ResourceType, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: RESOURCE_CHANGE.to_string(),
            resource_type,
            time: Utc::now().timestamp_millis(),
            data,
        }
    }

    pub fn activity(activity: &Activity) -> Self {
        Self::new(
            ResourceType::Activity,
            serde_json::to_value(activity).unwrap_or_default(),
        )
    }

    pub fn pipeline(pipeline: &Pipeline) -> Self {
        Self::new(
            ResourceType::Pipeline,
            serde_json::to_value(pipeline).unwrap_or_default(),
        )
    }

    pub fn account(account: &GitAccount) -> Self {
        Self::new(
            ResourceType::GitAccount,
            serde_json::to_value(account.redacted()).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_change_message() {
        let pipeline = Pipeline {
            name: "app".to_string(),
            ..Default::default()
        };
        let msg = ChangeMessage::pipeline(&pipeline);

        assert_eq!(msg.name, RESOURCE_CHANGE);
        assert_eq!(msg.resource_type, ResourceType::Pipeline);
        assert_eq!(msg.data["name"], "app");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["resourceType"], "pipeline");
    }

    #[test]
    fn test_account_change_is_redacted() {
        let account = GitAccount {
            login: "octo".to_string(),
            access_token: "s3cret".to_string(),
            ..Default::default()
        };
        let msg = ChangeMessage::account(&account);
        assert!(msg.data.get("accessToken").is_none());
        assert_eq!(msg.resource_type, ResourceType::GitAccount);
    }
}
