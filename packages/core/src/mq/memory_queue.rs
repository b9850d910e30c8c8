use super::{Delivery, Headers, QueueError, WorkQueue};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    headers: Headers,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    published: usize,
}

/// In-process broker with manual acknowledgement
///
/// Unacked messages are held per delivery tag; `nack` with requeue puts the
/// message back at the front.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    next_tag: AtomicU64,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message ever published to `queue`, including republished retries
    pub async fn published_total(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.published)
            .unwrap_or(0)
    }

    pub async fn unacked(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Remove and return every ready message without delivering it
    pub async fn drain(&self, queue: &str) -> Vec<(Vec<u8>, Headers)> {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(queue) {
            Some(q) => q.ready.drain(..).map(|m| (m.body, m.headers)).collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        headers: Headers,
    ) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().await;
            let state = queues
                .get_mut(queue)
                .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))?;
            state.ready.push_back(Message { body, headers });
            state.published += 1;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, QueueError> {
        loop {
            // Registered before the check so a publish in between is not missed
            let notified = self.notify.notified();
            {
                let mut queues = self.queues.lock().await;
                let state = queues
                    .get_mut(queue)
                    .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))?;
                if let Some(message) = state.ready.pop_front() {
                    let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
                    state.unacked.insert(tag, message.clone());
                    return Ok(Delivery {
                        queue: queue.to_string(),
                        tag,
                        body: message.body,
                        headers: message.headers,
                    });
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.unacked.remove(&delivery.tag))
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            })
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().await;
            let state = queues.get_mut(&delivery.queue).ok_or_else(|| {
                QueueError::NotDeclared(delivery.queue.clone())
            })?;
            let message = state.unacked.remove(&delivery.tag).ok_or_else(|| {
                QueueError::UnknownDelivery {
                    queue: delivery.queue.clone(),
                    tag: delivery.tag,
                }
            })?;
            if requeue {
                state.ready.push_front(message);
            }
        }
        if requeue {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.ready.len())
            .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))
    }
}
