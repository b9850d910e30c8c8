//! Content-hash registry used for upload deduplication
//!
//! Keys are `"{tenant}_{sha256(payload)}"`, values the storage path of the blob
//! that already holds those bytes.

use super::sqlite::SqliteHandle;
use super::DatabaseError;
use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

#[async_trait]
pub trait HashRegistry: Send + Sync {
    /// Insert or replace the storage path for `key`
    async fn upsert(&self, key: &str, storage_path: &str) -> Result<(), DatabaseError>;

    async fn lookup(&self, key: &str) -> Result<Option<String>, DatabaseError>;
}

#[derive(Debug, Default)]
pub struct MemoryHashRegistry {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryHashRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashRegistry for MemoryHashRegistry {
    async fn upsert(&self, key: &str, storage_path: &str) -> Result<(), DatabaseError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), storage_path.to_string());
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.entries.read().await.get(key).cloned())
    }
}

/// Registry persisted in a libsql table
pub struct LibsqlHashRegistry {
    handle: SqliteHandle,
}

impl LibsqlHashRegistry {
    pub async fn open(db_path: &Path) -> Result<Self, DatabaseError> {
        let handle = SqliteHandle::open(db_path).await?;
        handle
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS content_hashes (
                    hash_key TEXT PRIMARY KEY,
                    storage_path TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            )
            .await?;
        Ok(Self { handle })
    }
}

#[async_trait]
impl HashRegistry for LibsqlHashRegistry {
    async fn upsert(&self, key: &str, storage_path: &str) -> Result<(), DatabaseError> {
        self.handle
            .conn
            .execute(
                "INSERT INTO content_hashes (hash_key, storage_path, updated_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(hash_key) DO UPDATE SET
                    storage_path = excluded.storage_path,
                    updated_at = excluded.updated_at",
                params![key, storage_path, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::query_failed(format!("upsert {}: {}", key, e)))?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .handle
            .conn
            .query(
                "SELECT storage_path FROM content_hashes WHERE hash_key = ?",
                params![key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }
}
