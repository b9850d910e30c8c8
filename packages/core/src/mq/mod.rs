//! Work Queue
//!
//! Durable work queue with manual acknowledgement, as used by the merge
//! pipeline. Messages carry an opaque body and string headers; the retry count
//! travels in the `x-retries` header.
//!
//! - [`MemoryQueue`] - In-process broker, lost on restart
//! - [`LibsqlQueue`] - Messages persisted in a libsql table; deliveries left
//!   unacked by a previous run are redelivered on open

mod libsql_queue;
mod memory_queue;

pub use libsql_queue::LibsqlQueue;
pub use memory_queue::MemoryQueue;

use crate::db::DatabaseError;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Header holding how many times a message has been republished.
pub const RETRIES_HEADER: &str = "x-retries";

pub type Headers = BTreeMap<String, String>;

/// Queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue not declared: {0}")]
    NotDeclared(String),

    #[error("Unknown delivery tag {tag} on queue {queue}")]
    UnknownDelivery { queue: String, tag: u64 },

    #[error("Queue closed: {0}")]
    Closed(String),

    #[error("Queue storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Invalid message headers: {0}")]
    Headers(#[from] serde_json::Error),
}

/// A received, not yet acknowledged message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub tag: u64,
    pub body: Vec<u8>,
    pub headers: Headers,
}

impl Delivery {
    /// Retry count from the headers; missing or garbled means 0
    pub fn retries(&self) -> u32 {
        retries_of(&self.headers)
    }
}

pub fn retries_of(headers: &Headers) -> u32 {
    headers
        .get(RETRIES_HEADER)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub fn headers_with_retries(retries: u32) -> Headers {
    let mut headers = Headers::new();
    headers.insert(RETRIES_HEADER.to_string(), retries.to_string());
    headers
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Create `queue` if it does not exist
    async fn declare(&self, queue: &str) -> Result<(), QueueError>;

    async fn publish(&self, queue: &str, body: Vec<u8>, headers: Headers)
        -> Result<(), QueueError>;

    /// Wait for the next message; it stays unacked until `ack` or `nack`
    async fn receive(&self, queue: &str) -> Result<Delivery, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Reject a delivery, optionally putting it back at the front of the queue
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;

    /// Messages waiting to be received
    async fn depth(&self, queue: &str) -> Result<usize, QueueError>;
}
