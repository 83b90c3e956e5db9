//! Git account DTOs

use serde::{Deserialize, Serialize};

use crate::domain::account::GitAccount;

/// Request to register a git account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    /// `github` or `gitlab`
    pub account_type: String,
    pub login: String,
    #[serde(default)]
    pub name: String,
    pub access_token: String,
    #[serde(default)]
    pub private: bool,
}

impl CreateAccount {
    /// Build the account owned by `owner_id`, keyed by `type:login`
    pub fn into_account(self, owner_id: &str) -> GitAccount {
        GitAccount {
            id: format!("{}:{}", self.account_type, self.login),
            account_type: self.account_type,
            login: self.login,
            name: self.name,
            access_token: self.access_token,
            private: self.private,
            owner_id: owner_id.to_string(),
            ..Default::default()
        }
    }
}
