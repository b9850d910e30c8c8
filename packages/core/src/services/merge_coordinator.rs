//! Merge producer
//!
//! After each stored chunk the upload path asks the coordinator whether the
//! group is complete. If so it publishes one [`MergeMessage`] with the tokens in
//! index order and `x-retries = 0`, then clears the tracker entry.
//!
//! The clear happens after the publish and is best-effort. Two uploads racing on
//! the last chunk can both dispatch; the worker tolerates that because the final
//! blob name is deterministic and re-inserting an existing path is a no-op.

use crate::models::{order_chunk_tokens, MergeMessage};
use crate::mq::{headers_with_retries, WorkQueue};
use crate::services::chunk_tracker::ChunkTracker;
use crate::services::error::UploadError;
use std::sync::Arc;

/// Everything a merge message carries besides the chunk list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTarget {
    pub tenant: String,
    pub final_blob_name: String,
    pub content_type: String,
    pub target_path: String,
    pub relative_path: String,
    pub display_name: String,
    pub file_hash: String,
    pub declared_size: u64,
}

impl MergeTarget {
    fn into_message(self, chunks: Vec<String>) -> MergeMessage {
        MergeMessage {
            tenant: self.tenant,
            chunks,
            final_blob_name: self.final_blob_name,
            content_type: self.content_type,
            target_path: self.target_path,
            relative_path: self.relative_path,
            display_name: self.display_name,
            file_hash: self.file_hash,
            declared_size: self.declared_size,
        }
    }
}

/// Result of a completeness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Still waiting for chunks
    Pending { received: usize, expected: usize },
    /// All chunks present; this message was queued
    Dispatched(MergeMessage),
}

#[derive(Clone)]
pub struct MergeCoordinator {
    tracker: ChunkTracker,
    queue: Arc<dyn WorkQueue>,
    merge_queue: String,
}

impl MergeCoordinator {
    pub fn new(
        tracker: ChunkTracker,
        queue: Arc<dyn WorkQueue>,
        merge_queue: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            queue,
            merge_queue: merge_queue.into(),
        }
    }

    pub fn tracker(&self) -> &ChunkTracker {
        &self.tracker
    }

    /// Publish a merge for `group_key` once `expected` chunks are recorded.
    pub async fn dispatch_if_complete(
        &self,
        group_key: &str,
        expected: usize,
        received: usize,
        target: MergeTarget,
    ) -> Result<DispatchOutcome, UploadError> {
        let Some(tokens) = self.tracker.try_complete(group_key, expected).await? else {
            return Ok(DispatchOutcome::Pending { received, expected });
        };

        let ordered = order_chunk_tokens(&tokens);
        let mut chunks = ordered.raw();
        if !ordered.rejected.is_empty() {
            // Passed through so the worker fails the merge instead of guessing
            tracing::warn!(
                "Group {} has unparsable chunk tokens: {:?}",
                group_key,
                ordered.rejected
            );
            chunks.extend(ordered.rejected);
        }

        let message = target.into_message(chunks);
        let body = serde_json::to_vec(&message)?;
        self.queue
            .publish(&self.merge_queue, body, headers_with_retries(0))
            .await?;
        tracing::info!(
            "Dispatched merge of {} chunks into {} for {}",
            message.chunks.len(),
            message.final_blob_name,
            message.tenant
        );

        if let Err(e) = self.tracker.clear(group_key).await {
            tracing::warn!("Failed to clear chunk group {}: {}", group_key, e);
        }
        Ok(DispatchOutcome::Dispatched(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryListCache;
    use crate::mq::{MemoryQueue, RETRIES_HEADER};

    fn target() -> MergeTarget {
        MergeTarget {
            tenant: "t1".to_string(),
            final_blob_name: "final.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            target_path: "t1".to_string(),
            relative_path: "big.bin".to_string(),
            display_name: "big.bin".to_string(),
            file_hash: "wholehash".to_string(),
            declared_size: 9,
        }
    }

    #[tokio::test]
    async fn test_dispatch_once_complete() -> anyhow::Result<()> {
        let queue = Arc::new(MemoryQueue::new());
        queue.declare("file").await?;
        let tracker = ChunkTracker::new(Arc::new(MemoryListCache::new()));
        let coordinator = MergeCoordinator::new(tracker.clone(), queue.clone(), "file");

        tracker.record_chunk("g", "final.bin", 2).await?;
        let pending = coordinator.dispatch_if_complete("g", 2, 1, target()).await?;
        assert_eq!(
            pending,
            DispatchOutcome::Pending {
                received: 1,
                expected: 2
            }
        );

        tracker.record_chunk("g", "final.bin", 1).await?;
        let outcome = coordinator.dispatch_if_complete("g", 2, 2, target()).await?;
        let DispatchOutcome::Dispatched(message) = outcome else {
            panic!("expected dispatch");
        };
        assert_eq!(message.chunks, vec!["final.bin_1", "final.bin_2"]);

        let queued = queue.drain("file").await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].1.get(RETRIES_HEADER).map(String::as_str), Some("0"));
        let decoded: MergeMessage = serde_json::from_slice(&queued[0].0)?;
        assert_eq!(decoded, message);

        // tracker entry cleared after publish
        assert!(!tracker.clear("g").await?);
        Ok(())
    }
}
