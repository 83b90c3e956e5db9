//! Postgres object store
//!
//! Backed by the `objects` table created in `db::run_migrations`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ObjectStore, Page, PageRequest, StoreError, StoredObject};

pub struct PgObjectStore {
    pool: PgPool,
}

impl PgObjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn get(&self, kind: &str, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let row = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, key, name, data
            FROM objects
            WHERE kind = $1 AND key = $2
            "#,
        )
        .bind(kind)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list(&self, kind: &str, page: PageRequest) -> Result<Page, StoreError> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, key, name, data
            FROM objects
            WHERE kind = $1 AND ($2::TEXT IS NULL OR key > $2)
            ORDER BY key
            LIMIT $3
            "#,
        )
        .bind(kind)
        .bind(page.marker.as_deref())
        .bind(page.limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut items: Vec<StoredObject> = rows.into_iter().map(|r| r.into()).collect();
        let next_marker = if items.len() > page.limit {
            items.truncate(page.limit);
            items.last().map(|object| object.key.clone())
        } else {
            None
        };

        Ok(Page { items, next_marker })
    }

    async fn create(&self, object: StoredObject) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO objects (kind, key, name, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, key) DO NOTHING
            "#,
        )
        .bind(&object.kind)
        .bind(&object.key)
        .bind(&object.name)
        .bind(&object.data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                key: object.key,
            });
        }
        Ok(())
    }

    async fn update(&self, object: StoredObject) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE objects
            SET name = $3, data = $4, updated_at = now()
            WHERE kind = $1 AND key = $2
            "#,
        )
        .bind(&object.kind)
        .bind(&object.key)
        .bind(&object.name)
        .bind(&object.data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: object.kind,
                key: object.key,
            });
        }
        Ok(())
    }

    async fn delete(&self, kind: &str, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM objects WHERE kind = $1 AND key = $2")
            .bind(kind)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct ObjectRow {
    kind: String,
    key: String,
    name: String,
    data: serde_json::Value,
}

impl From<ObjectRow> for StoredObject {
    fn from(row: ObjectRow) -> Self {
        StoredObject {
            kind: row.kind,
            key: row.key,
            name: row.name,
            data: row.data,
        }
    }
}
