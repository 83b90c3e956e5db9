//! In-memory object store

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ObjectStore, Page, PageRequest, StoreError, StoredObject};

/// Object store held in process memory, keyed by (kind, key)
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, kind: &str, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(kind.to_string(), key.to_string())).cloned())
    }

    async fn list(&self, kind: &str, page: PageRequest) -> Result<Page, StoreError> {
        let objects = self.objects.read().await;
        let mut items: Vec<StoredObject> = objects
            .iter()
            .filter(|((k, key), _)| {
                k == kind && page.marker.as_ref().is_none_or(|marker| key > marker)
            })
            .map(|(_, object)| object.clone())
            .take(page.limit + 1)
            .collect();

        let next_marker = if items.len() > page.limit {
            items.truncate(page.limit);
            items.last().map(|object| object.key.clone())
        } else {
            None
        };

        Ok(Page { items, next_marker })
    }

    async fn create(&self, object: StoredObject) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let id = (object.kind.clone(), object.key.clone());
        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                key: object.key,
            });
        }
        objects.insert(id, object);
        Ok(())
    }

    async fn update(&self, object: StoredObject) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        match objects.get_mut(&(object.kind.clone(), object.key.clone())) {
            Some(existing) => {
                *existing = object;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: object.kind,
                key: object.key,
            }),
        }
    }

    async fn delete(&self, kind: &str, key: &str) -> Result<bool, StoreError> {
        let mut objects = self.objects.write().await;
        Ok(objects.remove(&(kind.to_string(), key.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::list_all;

    fn object(kind: &str, key: &str) -> StoredObject {
        StoredObject {
            kind: kind.to_string(),
            key: key.to_string(),
            name: key.to_string(),
            data: serde_json::json!({ "key": key }),
        }
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let store = MemoryObjectStore::new();
        store.create(object("pipeline", "a")).await.unwrap();
        assert!(matches!(
            store.create(object("pipeline", "a")).await,
            Err(StoreError::AlreadyExists { .. })
        ));

        let mut updated = object("pipeline", "a");
        updated.data = serde_json::json!({ "v": 2 });
        store.update(updated).await.unwrap();
        let fetched = store.get("pipeline", "a").await.unwrap().unwrap();
        assert_eq!(fetched.data["v"], 2);

        assert!(store.get("activity", "a").await.unwrap().is_none());
        assert!(matches!(
            store.update(object("activity", "a")).await,
            Err(StoreError::NotFound { .. })
        ));

        assert!(store.delete("pipeline", "a").await.unwrap());
        assert!(!store.delete("pipeline", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_pages_by_marker() {
        let store = MemoryObjectStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store.create(object("activity", key)).await.unwrap();
        }
        store.create(object("pipeline", "p")).await.unwrap();

        let first = store
            .list(
                "activity",
                PageRequest {
                    marker: None,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let last = store
            .list(
                "activity",
                PageRequest {
                    marker: Some("d".to_string()),
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].key, "e");
        assert!(last.next_marker.is_none());

        assert_eq!(list_all(&store, "activity").await.unwrap().len(), 5);
        assert_eq!(list_all(&store, "pipeline").await.unwrap().len(), 1);
    }
}
