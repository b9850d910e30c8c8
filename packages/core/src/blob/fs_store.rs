use super::{public_read_policy, validate_key, BlobError, BlobStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const POLICY_FILE: &str = ".policy.json";

/// Blob store on the local filesystem
///
/// Layout: `<root>/<bucket>/<key>`, plus `<root>/<bucket>/.policy.json`.
/// Content types are not persisted.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BlobError> {
        validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(BlobError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, BlobError> {
        let dir = self.bucket_dir(bucket)?;
        if tokio::fs::try_exists(&dir).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&dir).await?;
        let policy = serde_json::to_vec_pretty(&public_read_policy(bucket))?;
        tokio::fs::write(dir.join(POLICY_FILE), policy).await?;
        tracing::info!("Created bucket {} with public-read policy", bucket);
        Ok(true)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), BlobError> {
        validate_key(key)?;
        let dir = self.bucket_dir(bucket)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(BlobError::BucketMissing(bucket.to_string()));
        }
        let path = dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        validate_key(key)?;
        let path = self.bucket_dir(bucket)?.join(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::not_found(bucket, key))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_round_trip_on_disk() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = FsBlobStore::new(dir.path());

        assert!(store.ensure_bucket("remote-disk").await?);
        assert!(!store.ensure_bucket("remote-disk").await?);
        assert!(dir.path().join("remote-disk").join(POLICY_FILE).exists());

        store
            .put("remote-disk", "t1/a.txt", b"hello".to_vec(), "text/plain")
            .await?;
        assert_eq!(store.get("remote-disk", "t1/a.txt").await?, b"hello");

        let missing = store.get("remote-disk", "t1/b.txt").await;
        assert!(matches!(missing, Err(BlobError::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_put_requires_bucket() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = FsBlobStore::new(dir.path());
        let result = store.put("nope", "t1/a", vec![1], "").await;
        assert!(matches!(result, Err(BlobError::BucketMissing(_))));
        Ok(())
    }
}
