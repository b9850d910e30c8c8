use super::{public_read_policy, validate_key, BlobError, BlobStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Bucket {
    policy: Value,
    objects: HashMap<String, (Vec<u8>, String)>,
}

/// Blob store held in memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded at `put` time
    pub async fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)?
            .objects
            .get(key)
            .map(|(_, ct)| ct.clone())
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    pub async fn policy(&self, bucket: &str) -> Option<Value> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.policy.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, BlobError> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Ok(false);
        }
        buckets.insert(
            bucket.to_string(),
            Bucket {
                policy: public_read_policy(bucket),
                objects: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobError> {
        validate_key(key)?;
        let mut buckets = self.buckets.write().await;
        let target = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobError::BucketMissing(bucket.to_string()))?;
        target
            .objects
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| BlobError::not_found(bucket, key))
    }
}
