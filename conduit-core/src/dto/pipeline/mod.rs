//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query of the webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQuery {
    pub pipeline_id: Uuid,
}

/// Response of a manual or webhook triggered run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub activity_id: Uuid,
    pub run_sequence: u32,
}
