//! Repository Module
//!
//! Typed access to the object store.
//! Each repository encodes one domain entity under its own kind.

pub mod account;
pub mod activity;
pub mod pipeline;

// Re-export for convenience
pub use account as account_repository;
pub use activity as activity_repository;
pub use pipeline as pipeline_repository;

use serde::{Serialize, de::DeserializeOwned};

use crate::store::{StoreError, StoredObject};

fn encode<T: Serialize>(kind: &str, key: String, name: &str, value: &T) -> Result<StoredObject, StoreError> {
    Ok(StoredObject {
        kind: kind.to_string(),
        key,
        name: name.to_string(),
        data: serde_json::to_value(value)?,
    })
}

fn decode<T: DeserializeOwned>(object: StoredObject) -> Result<T, StoreError> {
    Ok(serde_json::from_value(object.data)?)
}
