//! Git command line backed source control

use async_trait::async_trait;
use conduit_core::domain::pipeline::Pipeline;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::process::Command;

use super::{ScmError, SourceControl, WebhookRequest, WebhookSource};

type HmacSha1 = Hmac<Sha1>;

/// `sha1=` followed by 40 hex digits
const GITHUB_SIGNATURE_LEN: usize = 45;

/// Uses the local `git` binary to query remotes
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn head_commit(&self, repo_url: &str, branch: &str) -> Result<String, ScmError> {
        let output = Command::new("git")
            .arg("ls-remote")
            .arg(repo_url)
            .arg(format!("refs/heads/{branch}"))
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ScmError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ls_remote(&stdout).ok_or_else(|| ScmError::BranchNotFound(branch.to_string()))
    }

    fn verify_webhook_payload(&self, pipeline: &Pipeline, request: &WebhookRequest) -> bool {
        let Some(scm) = pipeline.scm_step() else {
            return false;
        };

        match request.source {
            WebhookSource::Github => {
                if request.is_ping() {
                    return true;
                }
                if request.event != "push" {
                    tracing::warn!("Ignoring GitHub '{}' event, expected push", request.event);
                    return false;
                }
                let Some(signature) = request.signature.as_deref() else {
                    tracing::warn!("GitHub webhook without signature");
                    return false;
                };
                if !verify_github_signature(pipeline.webhook_token.as_bytes(), signature, &request.body) {
                    tracing::warn!("GitHub webhook signature mismatch for pipeline {}", pipeline.id);
                    return false;
                }
            }
            WebhookSource::Gitlab => {
                if request.event != "Push Hook" {
                    tracing::warn!("Ignoring GitLab '{}' event, expected push hook", request.event);
                    return false;
                }
                if request.signature.as_deref() != Some(pipeline.webhook_token.as_str()) {
                    tracing::warn!("GitLab webhook token mismatch for pipeline {}", pipeline.id);
                    return false;
                }
            }
        }

        let pushed_ref = serde_json::from_slice::<serde_json::Value>(&request.body)
            .ok()
            .and_then(|payload| payload.get("ref").and_then(|r| r.as_str()).map(str::to_string));
        let expected = format!("refs/heads/{}", scm.branch);
        if pushed_ref.as_deref() != Some(expected.as_str()) {
            tracing::warn!(
                "Webhook branch mismatch for pipeline {}: {:?} != {}",
                pipeline.id,
                pushed_ref,
                expected
            );
            return false;
        }
        true
    }
}

/// First hash of `git ls-remote` output
fn parse_ls_remote(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .find(|hash| !hash.is_empty())
        .map(str::to_string)
}

/// Check an `X-Hub-Signature` header against the HMAC-SHA1 of the body
pub fn verify_github_signature(secret: &[u8], signature: &str, body: &[u8]) -> bool {
    if signature.len() != GITHUB_SIGNATURE_LEN {
        return false;
    }
    let Some(digest) = signature.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
