//! Object Store
//!
//! Generic persistence boundary. Every record is an opaque JSON blob keyed by
//! a business id and tagged with a kind; listing filters by kind and pages by
//! marker. The store offers no transactions: callers serialize
//! read-modify-write cycles themselves.

pub mod memory;
pub mod postgres;

pub use memory::MemoryObjectStore;
pub use postgres::PgObjectStore;

use async_trait::async_trait;

/// Default page size used when walking a whole kind
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },
}

/// A stored blob with its identity
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub kind: String,
    pub key: String,
    pub name: String,
    pub data: serde_json::Value,
}

/// Page selection: items with a key strictly greater than `marker`
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub marker: Option<String>,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            marker: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of results; `next_marker` is set when more items follow
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<StoredObject>,
    pub next_marker: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: &str, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// List objects of `kind` ordered by key
    async fn list(&self, kind: &str, page: PageRequest) -> Result<Page, StoreError>;

    /// Insert a new object, failing when the key is taken
    async fn create(&self, object: StoredObject) -> Result<(), StoreError>;

    /// Replace an existing object, failing when it is absent
    async fn update(&self, object: StoredObject) -> Result<(), StoreError>;

    /// Returns whether an object was removed
    async fn delete(&self, kind: &str, key: &str) -> Result<bool, StoreError>;
}

/// Collect every object of `kind`, following markers until exhausted
pub async fn list_all(store: &dyn ObjectStore, kind: &str) -> Result<Vec<StoredObject>, StoreError> {
    let mut items = Vec::new();
    let mut page = PageRequest::default();
    loop {
        let result = store.list(kind, page.clone()).await?;
        items.extend(result.items);
        match result.next_marker {
            Some(marker) => page.marker = Some(marker),
            None => return Ok(items),
        }
    }
}
