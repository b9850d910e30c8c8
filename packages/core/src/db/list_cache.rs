//! Keyed ordered lists
//!
//! The chunk tracker appends one token per stored chunk and reads the whole list
//! back to decide completeness. Lists keep insertion order.

use super::sqlite::SqliteHandle;
use super::DatabaseError;
use async_trait::async_trait;
use libsql::params;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

#[async_trait]
pub trait ListCache: Send + Sync {
    /// Push `value` to the end of `key`'s list; returns the new length
    async fn append(&self, key: &str, value: &str) -> Result<usize, DatabaseError>;

    /// The full list in insertion order (empty when the key is unknown)
    async fn read_all(&self, key: &str) -> Result<Vec<String>, DatabaseError>;

    /// Drop the list; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, DatabaseError>;
}

#[derive(Debug, Default)]
pub struct MemoryListCache {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryListCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListCache for MemoryListCache {
    async fn append(&self, key: &str, value: &str) -> Result<usize, DatabaseError> {
        let mut lists = self.lists.lock().await;
        let list = lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .lists
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<bool, DatabaseError> {
        Ok(self.lists.lock().await.remove(key).is_some())
    }
}

/// List cache persisted in a libsql table
pub struct LibsqlListCache {
    handle: SqliteHandle,
}

impl LibsqlListCache {
    /// Open the cache at `db_path` (`":memory:"` for a volatile one)
    pub async fn open(db_path: &Path) -> Result<Self, DatabaseError> {
        let handle = SqliteHandle::open(db_path).await?;
        handle
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS chunk_lists (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    list_key TEXT NOT NULL,
                    value TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_chunk_lists_key ON chunk_lists(list_key);",
            )
            .await?;
        Ok(Self { handle })
    }
}

#[async_trait]
impl ListCache for LibsqlListCache {
    async fn append(&self, key: &str, value: &str) -> Result<usize, DatabaseError> {
        self.handle
            .conn
            .execute(
                "INSERT INTO chunk_lists (list_key, value) VALUES (?, ?)",
                params![key, value],
            )
            .await
            .map_err(|e| DatabaseError::query_failed(format!("append to {}: {}", key, e)))?;

        let mut rows = self
            .handle
            .conn
            .query(
                "SELECT COUNT(*) FROM chunk_lists WHERE list_key = ?",
                params![key],
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count as usize)
    }

    async fn read_all(&self, key: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .handle
            .conn
            .query(
                "SELECT value FROM chunk_lists WHERE list_key = ? ORDER BY id",
                params![key],
            )
            .await?;
        let mut values = Vec::new();
        while let Some(row) = rows.next().await? {
            values.push(row.get::<String>(0)?);
        }
        Ok(values)
    }

    async fn delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .handle
            .conn
            .execute("DELETE FROM chunk_lists WHERE list_key = ?", params![key])
            .await?;
        Ok(removed > 0)
    }
}
