//! Git account endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use conduit_core::domain::account::GitAccount;
use conduit_core::dto::account::CreateAccount;
use reqwest::Method;

impl OrchestratorClient {
    // =============================================================================
    // Git Accounts
    // =============================================================================

    /// Register credentials used when polling private repositories.
    /// The returned account has its token redacted.
    pub async fn create_account(&self, req: &CreateAccount) -> Result<GitAccount> {
        let response = self.request(Method::POST, "/accounts").json(req).send().await?;
        self.handle_response(response).await
    }

    /// List accounts, tokens redacted
    pub async fn list_accounts(&self) -> Result<Vec<GitAccount>> {
        let response = self.request(Method::GET, "/accounts").send().await?;
        self.handle_response(response).await
    }

    /// Delete an account
    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/accounts/{}", account_id))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
