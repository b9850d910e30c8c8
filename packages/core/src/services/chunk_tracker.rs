//! Chunk Tracker
//!
//! Records which chunks of a logical upload have been stored. Completeness is a
//! point-in-time check: the list length must equal the expected chunk count.

use crate::db::{DatabaseError, ListCache};
use crate::models::ChunkToken;
use std::sync::Arc;

#[derive(Clone)]
pub struct ChunkTracker {
    cache: Arc<dyn ListCache>,
}

impl ChunkTracker {
    pub fn new(cache: Arc<dyn ListCache>) -> Self {
        Self { cache }
    }

    /// Append the token for `blob_name`/`index` to the group; returns how many
    /// chunks are recorded now.
    pub async fn record_chunk(
        &self,
        group_key: &str,
        blob_name: &str,
        index: u32,
    ) -> Result<usize, DatabaseError> {
        let token = ChunkToken::new(blob_name, index).token();
        let count = self.cache.append(group_key, &token).await?;
        tracing::debug!("Recorded chunk {} for {} ({} so far)", token, group_key, count);
        Ok(count)
    }

    /// The recorded tokens when exactly `expected` chunks are present.
    pub async fn try_complete(
        &self,
        group_key: &str,
        expected: usize,
    ) -> Result<Option<Vec<String>>, DatabaseError> {
        let tokens = self.cache.read_all(group_key).await?;
        if tokens.len() == expected {
            Ok(Some(tokens))
        } else {
            Ok(None)
        }
    }

    /// Forget the group; returns whether anything was recorded.
    pub async fn clear(&self, group_key: &str) -> Result<bool, DatabaseError> {
        self.cache.delete(group_key).await
    }
}
