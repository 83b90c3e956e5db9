//! Pipeline Repository
//!
//! Stores pipelines under the `pipeline` kind, keyed by id.

use conduit_core::domain::pipeline::Pipeline;
use uuid::Uuid;

use super::{decode, encode};
use crate::store::{self, ObjectStore, StoreError};

pub const KIND: &str = "pipeline";

/// Insert a new pipeline
pub async fn create(store: &dyn ObjectStore, pipeline: &Pipeline) -> Result<(), StoreError> {
    store
        .create(encode(KIND, pipeline.id.to_string(), &pipeline.name, pipeline)?)
        .await
}

/// Find a pipeline by ID
pub async fn find_by_id(store: &dyn ObjectStore, id: Uuid) -> Result<Option<Pipeline>, StoreError> {
    match store.get(KIND, &id.to_string()).await? {
        Some(object) => Ok(Some(decode(object)?)),
        None => Ok(None),
    }
}

/// List all pipelines
pub async fn list_all(store: &dyn ObjectStore) -> Result<Vec<Pipeline>, StoreError> {
    store::list_all(store, KIND)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

/// Replace a stored pipeline
pub async fn update(store: &dyn ObjectStore, pipeline: &Pipeline) -> Result<(), StoreError> {
    store
        .update(encode(KIND, pipeline.id.to_string(), &pipeline.name, pipeline)?)
        .await
}

/// Delete a pipeline by ID
pub async fn delete(store: &dyn ObjectStore, id: Uuid) -> Result<bool, StoreError> {
    store.delete(KIND, &id.to_string()).await
}
