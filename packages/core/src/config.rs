//! Runtime configuration
//!
//! Everything has a default; `CoreConfig::from_env()` overrides individual
//! fields from `GRAPHDISK_*` environment variables. Unparsable values fall back
//! to the default instead of failing start-up.

use crate::models::ADMIN_IDENTITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration shared by every service of a [`crate::GraphDisk`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Holds the graph database and the libsql files
    pub data_dir: PathBuf,
    /// Root of the filesystem blob store
    pub blob_root: PathBuf,
    /// Bucket receiving individual chunks
    pub chunk_bucket: String,
    /// Bucket receiving whole and merged files
    pub file_bucket: String,
    pub merge_queue: String,
    pub dead_letter_queue: String,
    /// Republish attempts before a message is dead-lettered
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Identity allowed to act on every tenant
    pub admin_identity: String,
    /// Upper bound on upward and downward graph walks
    pub max_walk_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            blob_root: PathBuf::from("./data/blobs"),
            chunk_bucket: "block-disk".to_string(),
            file_bucket: "remote-disk".to_string(),
            merge_queue: "file".to_string(),
            dead_letter_queue: "dead_letter_queue".to_string(),
            max_retries: 3,
            retry_backoff_ms: 10_000,
            admin_identity: ADMIN_IDENTITY.to_string(),
            max_walk_depth: 1024,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl CoreConfig {
    /// Defaults overridden by `GRAPHDISK_*` variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let data_dir: PathBuf = env_or("GRAPHDISK_DATA_DIR", defaults.data_dir);
        let blob_root = std::env::var("GRAPHDISK_BLOB_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("blobs"));

        Self {
            blob_root,
            chunk_bucket: env_or("GRAPHDISK_CHUNK_BUCKET", defaults.chunk_bucket),
            file_bucket: env_or("GRAPHDISK_FILE_BUCKET", defaults.file_bucket),
            merge_queue: env_or("GRAPHDISK_MERGE_QUEUE", defaults.merge_queue),
            dead_letter_queue: env_or("GRAPHDISK_DEAD_LETTER_QUEUE", defaults.dead_letter_queue),
            max_retries: env_or("GRAPHDISK_MAX_RETRIES", defaults.max_retries),
            retry_backoff_ms: env_or("GRAPHDISK_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            admin_identity: env_or("GRAPHDISK_ADMIN_IDENTITY", defaults.admin_identity),
            max_walk_depth: env_or("GRAPHDISK_MAX_WALK_DEPTH", defaults.max_walk_depth),
            data_dir,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join("graph")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }

    pub fn chunk_list_path(&self) -> PathBuf {
        self.data_dir.join("chunks.db")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.chunk_bucket, "block-disk");
        assert_eq!(config.file_bucket, "remote-disk");
        assert_eq!(config.merge_queue, "file");
        assert_eq!(config.admin_identity, "admin");
        assert_eq!(config.retry_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_override_and_fallback() {
        std::env::set_var("GRAPHDISK_MAX_RETRIES", "7");
        std::env::set_var("GRAPHDISK_RETRY_BACKOFF_MS", "not-a-number");
        let config = CoreConfig::from_env();
        std::env::remove_var("GRAPHDISK_MAX_RETRIES");
        std::env::remove_var("GRAPHDISK_RETRY_BACKOFF_MS");

        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_backoff_ms, 10_000);
    }
}
