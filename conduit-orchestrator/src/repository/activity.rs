//! Activity Repository
//!
//! Stores activities under the `activity` kind, keyed by id.

use conduit_core::domain::activity::Activity;
use uuid::Uuid;

use super::{decode, encode};
use crate::store::{self, ObjectStore, StoreError};

pub const KIND: &str = "activity";

fn to_object(activity: &Activity) -> Result<store::StoredObject, StoreError> {
    let key = activity.id.to_string();
    let name = key.clone();
    encode(KIND, key, &name, activity)
}

/// Insert a new activity
pub async fn create(store: &dyn ObjectStore, activity: &Activity) -> Result<(), StoreError> {
    store.create(to_object(activity)?).await
}

/// Find an activity by ID
pub async fn find_by_id(store: &dyn ObjectStore, id: Uuid) -> Result<Option<Activity>, StoreError> {
    match store.get(KIND, &id.to_string()).await? {
        Some(object) => Ok(Some(decode(object)?)),
        None => Ok(None),
    }
}

/// List all activities, newest first
pub async fn list_all(store: &dyn ObjectStore) -> Result<Vec<Activity>, StoreError> {
    let mut activities = store::list_all(store, KIND)
        .await?
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<Activity>, _>>()?;
    activities.sort_by(|a, b| b.start_ts.cmp(&a.start_ts));
    Ok(activities)
}

/// List the activities of one pipeline, newest first
pub async fn find_by_pipeline(
    store: &dyn ObjectStore,
    pipeline_id: Uuid,
) -> Result<Vec<Activity>, StoreError> {
    let mut activities = list_all(store).await?;
    activities.retain(|a| a.pipeline_id() == pipeline_id);
    Ok(activities)
}

/// Replace a stored activity
pub async fn update(store: &dyn ObjectStore, activity: &Activity) -> Result<(), StoreError> {
    store.update(to_object(activity)?).await
}

/// Delete an activity by ID
pub async fn delete(store: &dyn ObjectStore, id: Uuid) -> Result<bool, StoreError> {
    store.delete(KIND, &id.to_string()).await
}
