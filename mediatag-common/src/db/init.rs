//! Database initialization
//!
//! Opens (creating if needed) the SQLite file that backs the local key-value
//! index and ensures the item table exists.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_index_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new index database: {}", db_path.display());
    } else {
        info!("Opened existing index database: {}", db_path.display());
    }

    // Concurrent invocations share this file
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_index_items_table(&pool).await?;

    Ok(pool)
}

/// Create the item table (idempotent)
///
/// One row per (table, item id). `item` holds the attribute map as JSON.
pub async fn create_index_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_items (
            table_name TEXT NOT NULL,
            item_id TEXT NOT NULL,
            key_attribute TEXT NOT NULL,
            item TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (table_name, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
