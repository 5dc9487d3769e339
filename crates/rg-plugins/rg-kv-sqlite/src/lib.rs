//! # rg-kv-sqlite Implementation
//!
//! SQLite-backed `KeyValueStore`. Every key is a row of a single
//! `kv_store` table; writes are upserts, so same-key writes are
//! serialized by SQLite itself.

use async_trait::async_trait;
use rg_core::error::{AppError, Result};
use rg_core::traits::KeyValueStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

pub struct SqliteKvStore {
    pool: SqlitePool,
}

fn storage_error(err: sqlx::Error) -> AppError {
    AppError::Storage(err.to_string())
}

impl SqliteKvStore {
    /// Opens (creating if needed) the database at `database_url` and
    /// ensures the schema exists.
    ///
    /// # Developer Note
    /// Each connection to `sqlite::memory:` gets its own database, so the
    /// in-memory case is pinned to one long-lived connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage_error)?
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(storage_error)?;
        debug!(database_url, "sqlite key-value store ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let store = SqliteKvStore::new("sqlite::memory:").await.unwrap();
        assert_eq!(store.get("favorites").await.unwrap(), None);

        store.set("favorites", "[]").await.unwrap();
        store.set("favorites", "[{\"id\":\"1\"}]").await.unwrap();
        assert_eq!(
            store.get("favorites").await.unwrap().as_deref(),
            Some("[{\"id\":\"1\"}]")
        );

        store.remove("favorites").await.unwrap();
        assert_eq!(store.get("favorites").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let store = SqliteKvStore::new("sqlite::memory:").await.unwrap();
        store.set("settings", "{}").await.unwrap();
        store.set("image_cache_a", "{}").await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["image_cache_a".to_string(), "settings".to_string()]
        );
        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("gallery.db").display());

        {
            let store = SqliteKvStore::new(&url).await.unwrap();
            store.set("settings", "{\"grid_columns\":3}").await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteKvStore::new(&url).await.unwrap();
        assert_eq!(
            reopened.get("settings").await.unwrap().as_deref(),
            Some("{\"grid_columns\":3}")
        );
    }
}
