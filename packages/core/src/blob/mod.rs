//! Blob Storage
//!
//! Object storage for chunk and file bytes. Objects are addressed by bucket and
//! a `"{tenant}/{blobName}"` key. Buckets are created on demand with a
//! public-read policy attached.
//!
//! - [`FsBlobStore`] - One directory per bucket under a root directory
//! - [`MemoryBlobStore`] - In-process map, for tests and ephemeral setups

mod fs_store;
mod memory_store;

pub use fs_store::FsBlobStore;
pub use memory_store::MemoryBlobStore;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// Blob storage errors
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Bucket does not exist: {0}")]
    BucketMissing(String),

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Blob I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bucket policy error: {0}")]
    Policy(#[from] serde_json::Error),
}

impl BlobError {
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create `bucket` with a public-read policy if absent; returns whether it was created
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, BlobError>;

    /// Store `data` under `key`, overwriting any previous object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError>;
}

/// Object key for a tenant's blob.
pub fn object_key(tenant: &str, blob_name: &str) -> String {
    format!("{}/{}", tenant, blob_name)
}

/// Anonymous read access to every object in `bucket`.
pub fn public_read_policy(bucket: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "AWS": ["*"] },
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)]
        }]
    })
}

/// Reject keys that could escape their bucket.
pub(crate) fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|s| s.is_empty() || s == "." || s == "..");
    if bad {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("t1/file.bin").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("t1//x").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn test_policy_names_bucket() {
        let policy = public_read_policy("remote-disk");
        assert_eq!(
            policy["Statement"][0]["Resource"][0],
            "arn:aws:s3:::remote-disk/*"
        );
    }
}
