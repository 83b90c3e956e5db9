//! Git Account Repository

use conduit_core::domain::account::GitAccount;

use super::{decode, encode};
use crate::store::{self, ObjectStore, StoreError};

pub const KIND: &str = "gitaccount";

pub async fn create(store: &dyn ObjectStore, account: &GitAccount) -> Result<(), StoreError> {
    store
        .create(encode(KIND, account.id.clone(), &account.login, account)?)
        .await
}

pub async fn find_by_id(store: &dyn ObjectStore, id: &str) -> Result<Option<GitAccount>, StoreError> {
    match store.get(KIND, id).await? {
        Some(object) => Ok(Some(decode(object)?)),
        None => Ok(None),
    }
}

pub async fn list_all(store: &dyn ObjectStore) -> Result<Vec<GitAccount>, StoreError> {
    store::list_all(store, KIND)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

pub async fn delete(store: &dyn ObjectStore, id: &str) -> Result<bool, StoreError> {
    store.delete(KIND, id).await
}
