//! Per-activity locks
//!
//! Serializes every read-modify-write of a single activity while leaving
//! different activities fully parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Lazily created async mutex per activity id
#[derive(Clone, Default)]
pub struct ActivityLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ActivityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `id`, creating it on first access.
    ///
    /// Lookup and insertion happen under one map guard, so concurrent first
    /// callers always share the same mutex.
    fn get_or_create(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    /// Wait for exclusive access to the activity
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.get_or_create(id).lock_owned().await
    }

    /// Drop the lock of a deleted activity
    pub fn forget(&self, id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&id);
    }

    pub fn clear(&self) {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_shares_one_lock() {
        let locks = ActivityLocks::new();
        let id = Uuid::new_v4();

        let a = locks.get_or_create(id);
        let b = locks.get_or_create(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);

        locks.forget(id);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_touch_serializes() {
        let locks = ActivityLocks::new();
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = ActivityLocks::new();
        let _first = locks.lock(Uuid::new_v4()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(second.is_ok());
    }
}
