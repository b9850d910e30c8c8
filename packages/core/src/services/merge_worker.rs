//! Background Merge Worker
//!
//! Consumes merge messages one at a time:
//!
//! 1. Decode the message and check the chunk list forms `1..=n`
//! 2. Concatenate the chunk blobs in index order into the file bucket
//! 3. Insert the assembled file into the tenant's namespace
//! 4. Acknowledge
//!
//! ## Retry policy
//!
//! A transient failure (storage hiccup, chunk not visible yet) waits the
//! configured backoff, republishes the body with `x-retries + 1` and acks the
//! original. Once `x-retries` has reached `max_retries`, or when the failure is
//! permanent (bad JSON, bad chunk list, rejected insert), the original body and
//! headers go to the dead-letter queue verbatim and the original is acked.
//!
//! If the republish or dead-letter publish itself fails, the original is nacked
//! with requeue so the broker keeps it.

use crate::blob::{object_key, BlobStore};
use crate::config::CoreConfig;
use crate::models::content_type::resolve_content_type;
use crate::models::{
    order_chunk_tokens, Caller, InsertOutcome, InsertRequest, LeafDescriptor, MergeMessage,
};
use crate::mq::{Delivery, QueueError, WorkQueue, RETRIES_HEADER};
use crate::services::error::MergeError;
use crate::services::namespace_service::NamespaceService;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queue, bucket and retry settings of a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeWorkerConfig {
    pub merge_queue: String,
    pub dead_letter_queue: String,
    pub chunk_bucket: String,
    pub file_bucket: String,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&CoreConfig> for MergeWorkerConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            merge_queue: config.merge_queue.clone(),
            dead_letter_queue: config.dead_letter_queue.clone(),
            chunk_bucket: config.chunk_bucket.clone(),
            file_bucket: config.file_bucket.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// What happened to a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Merged(InsertOutcome),
    Retried { retries: u32 },
    DeadLettered,
}

/// Message handling, separate from the receive loop
#[derive(Clone)]
pub struct MergeProcessor {
    namespace: NamespaceService,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn WorkQueue>,
    config: MergeWorkerConfig,
}

impl MergeProcessor {
    pub fn new(
        namespace: NamespaceService,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn WorkQueue>,
        config: MergeWorkerConfig,
    ) -> Self {
        Self {
            namespace,
            blobs,
            queue,
            config,
        }
    }

    /// Merge the chunks named in `body` and insert the result.
    pub async fn process(&self, body: &[u8]) -> Result<InsertOutcome, MergeError> {
        let message: MergeMessage = serde_json::from_slice(body)
            .map_err(|e| MergeError::permanent(format!("malformed merge message: {}", e)))?;
        if message.tenant.trim().is_empty() || message.final_blob_name.trim().is_empty() {
            return Err(MergeError::permanent("merge message without tenant or blob name"));
        }

        let ordered = order_chunk_tokens(&message.chunks);
        ordered.validate().map_err(MergeError::permanent)?;

        // Sized from the fetched chunks; the declared size is client input
        let mut chunks = Vec::with_capacity(ordered.tokens.len());
        for token in &ordered.tokens {
            let key = object_key(&message.tenant, &token.token());
            chunks.push(self.blobs.get(&self.config.chunk_bucket, &key).await?);
        }
        let mut hasher = Sha256::new();
        let mut assembled = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in chunks {
            hasher.update(&chunk);
            assembled.extend_from_slice(&chunk);
        }

        let size = assembled.len() as u64;
        if message.declared_size != 0 && message.declared_size != size {
            tracing::warn!(
                "Merged {} is {} bytes, declared {}",
                message.final_blob_name,
                size,
                message.declared_size
            );
        }
        let content_hash = hex::encode(hasher.finalize());
        let content_type = resolve_content_type(&message.final_blob_name, &message.content_type);

        self.blobs.ensure_bucket(&self.config.file_bucket).await?;
        self.blobs
            .put(
                &self.config.file_bucket,
                &object_key(&message.tenant, &message.final_blob_name),
                assembled,
                &content_type,
            )
            .await?;

        let relative = if message.relative_path.trim().is_empty() {
            message.display_name.clone()
        } else {
            message.relative_path.clone()
        };
        let leaf = LeafDescriptor::file(
            message.final_blob_name.clone(),
            content_type,
            size,
            content_hash,
        );
        let outcome = self
            .namespace
            .insert_path(
                &Caller::new(message.tenant.clone()),
                InsertRequest::new(message.target_path.clone(), relative, leaf),
            )
            .await?;
        Ok(outcome)
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<Disposition, QueueError> {
        let err = match self.process(&delivery.body).await {
            Ok(outcome) => {
                self.queue.ack(&delivery).await?;
                tracing::info!("Merged {}", outcome.leaf().file_name);
                return Ok(Disposition::Merged(outcome));
            }
            Err(err) => err,
        };

        let retries = delivery.retries();
        if err.is_transient() && retries < self.config.max_retries {
            tracing::warn!(
                "Merge attempt {} failed, retrying in {:?}: {}",
                retries + 1,
                self.config.retry_backoff,
                err
            );
            tokio::time::sleep(self.config.retry_backoff).await;

            let mut headers = delivery.headers.clone();
            headers.insert(RETRIES_HEADER.to_string(), (retries + 1).to_string());
            let queue = self.config.merge_queue.clone();
            return self
                .forward(&delivery, &queue, headers)
                .await
                .map(|_| Disposition::Retried {
                    retries: retries + 1,
                });
        }

        tracing::error!(
            "Merge failed after {} retries, dead-lettering: {}",
            retries,
            err
        );
        let queue = self.config.dead_letter_queue.clone();
        self.forward(&delivery, &queue, delivery.headers.clone())
            .await
            .map(|_| Disposition::DeadLettered)
    }

    /// Publish the body to `queue`, then ack; nack with requeue if the publish fails.
    async fn forward(
        &self,
        delivery: &Delivery,
        queue: &str,
        headers: crate::mq::Headers,
    ) -> Result<(), QueueError> {
        match self
            .queue
            .publish(queue, delivery.body.clone(), headers)
            .await
        {
            Ok(()) => self.queue.ack(delivery).await,
            Err(e) => {
                tracing::error!("Failed to publish to {}: {}", queue, e);
                self.queue.nack(delivery, true).await?;
                Err(e)
            }
        }
    }
}

/// Handle to a running merge worker
///
/// Dropping the handle also stops the worker once its current message is done.
pub struct MergeWorker {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MergeWorker {
    /// Spawn the receive loop on the current runtime
    pub fn spawn(processor: MergeProcessor) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tracing::info!(
            "MergeWorker consuming from {}",
            processor.config.merge_queue
        );

        let handle = tokio::spawn(async move {
            let queue_name = processor.config.merge_queue.clone();
            loop {
                tokio::select! {
                    biased; // Check shutdown first

                    _ = shutdown_rx.recv() => {
                        tracing::info!("MergeWorker shutting down");
                        break;
                    }

                    delivery = processor.queue.receive(&queue_name) => match delivery {
                        Ok(delivery) => {
                            if let Err(e) = processor.handle_delivery(delivery).await {
                                tracing::error!("MergeWorker could not settle delivery: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("MergeWorker receive failed: {}", e);
                            tokio::time::sleep(processor.config.retry_backoff).await;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop after the in-flight message and wait for the loop to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::warn!("MergeWorker task ended abnormally: {}", e);
        }
    }
}
