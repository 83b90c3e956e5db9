//! Source control
//!
//! Branch head lookup for commit-gated cron runs and verification of
//! incoming push webhooks.

pub mod git;

pub use git::GitCli;

use async_trait::async_trait;
use axum::http::HeaderMap;
use conduit_core::domain::pipeline::Pipeline;

/// Source control error type
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),

    #[error("git command failed: {0}")]
    Command(String),

    #[error("branch '{0}' not found on remote")]
    BranchNotFound(String),

    #[error("unknown webhook source")]
    UnknownWebhookSource,
}

/// Origin of a webhook, detected from its event header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    Github,
    Gitlab,
}

/// The parts of a webhook request needed for verification
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub source: WebhookSource,
    pub event: String,
    /// `X-Hub-Signature` for GitHub, `X-Gitlab-Token` for GitLab
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn from_parts(headers: &HeaderMap, body: Vec<u8>) -> Result<Self, ScmError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(event) = header("X-GitHub-Event") {
            return Ok(Self {
                source: WebhookSource::Github,
                event,
                signature: header("X-Hub-Signature"),
                body,
            });
        }
        if let Some(event) = header("X-Gitlab-Event") {
            return Ok(Self {
                source: WebhookSource::Gitlab,
                event,
                signature: header("X-Gitlab-Token"),
                body,
            });
        }
        Err(ScmError::UnknownWebhookSource)
    }

    /// GitHub connectivity check sent when a hook is created
    pub fn is_ping(&self) -> bool {
        self.source == WebhookSource::Github && self.event == "ping"
    }
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Commit hash at the head of `branch` in the remote repository
    async fn head_commit(&self, repo_url: &str, branch: &str) -> Result<String, ScmError>;

    /// Whether the webhook is an authentic push to the pipeline's branch
    fn verify_webhook_payload(&self, pipeline: &Pipeline, request: &WebhookRequest) -> bool;
}
