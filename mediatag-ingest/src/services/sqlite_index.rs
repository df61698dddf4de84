//! SQLite key-value index
//!
//! Local backend for development and single-host deployments. Each item is
//! one row of `index_items`, keyed by (table name, item id), with the
//! attribute map stored as typed JSON.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::{IndexError, KeyValueIndex};
use crate::types::IndexItem;

/// SQLite-backed index
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Wrap a pool whose schema was created by `mediatag_common::db`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueIndex for SqliteIndex {
    async fn put_item(&self, table: &str, item: &IndexItem) -> Result<(), IndexError> {
        let id = item.id();
        if id.is_empty() {
            return Err(IndexError::InvalidItem(format!(
                "item has no '{}' attribute",
                item.key_attribute
            )));
        }

        let json = serde_json::to_string(&item.attributes)?;

        debug!(table, id, "Upserting index item");
        sqlx::query(
            r#"
            INSERT INTO index_items (table_name, item_id, key_attribute, item, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(table_name, item_id) DO UPDATE SET
                key_attribute = excluded.key_attribute,
                item = excluded.item,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(table)
        .bind(id)
        .bind(&item.key_attribute)
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
