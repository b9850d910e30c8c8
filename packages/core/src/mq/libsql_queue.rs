use super::{Delivery, Headers, QueueError, WorkQueue};
use crate::db::{DatabaseError, SqliteHandle};
use async_trait::async_trait;
use libsql::params;
use std::path::Path;
use tokio::sync::Notify;

const STATE_READY: &str = "ready";
const STATE_UNACKED: &str = "unacked";

/// Work queue persisted in libsql
///
/// Every message is one `queue_messages` row; its rowid is the delivery tag,
/// so a requeued message keeps its place at the front. Claiming a message is a
/// single `UPDATE … RETURNING`, which keeps concurrent receivers from taking
/// the same row.
pub struct LibsqlQueue {
    handle: SqliteHandle,
    notify: Notify,
}

impl LibsqlQueue {
    /// Open the queue at `db_path` (`":memory:"` for a volatile one)
    pub async fn open(db_path: &Path) -> Result<Self, QueueError> {
        let handle = SqliteHandle::open(db_path).await?;
        handle
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS queues (
                    name TEXT PRIMARY KEY
                );
                CREATE TABLE IF NOT EXISTS queue_messages (
                    tag INTEGER PRIMARY KEY AUTOINCREMENT,
                    queue TEXT NOT NULL,
                    body BLOB NOT NULL,
                    headers TEXT NOT NULL,
                    state TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_queue_messages_ready
                    ON queue_messages(queue, state, tag);",
            )
            .await?;

        // Nobody holds deliveries from a previous run
        let redelivered = handle
            .conn
            .execute(
                "UPDATE queue_messages SET state = ? WHERE state = ?",
                params![STATE_READY, STATE_UNACKED],
            )
            .await
            .map_err(DatabaseError::from)?;
        if redelivered > 0 {
            tracing::info!("LibsqlQueue redelivering {} unacked messages", redelivered);
        }

        Ok(Self {
            handle,
            notify: Notify::new(),
        })
    }

    async fn ensure_declared(&self, queue: &str) -> Result<(), QueueError> {
        let mut rows = self
            .handle
            .conn
            .query("SELECT 1 FROM queues WHERE name = ?", params![queue])
            .await
            .map_err(DatabaseError::from)?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(_) => Ok(()),
            None => Err(QueueError::NotDeclared(queue.to_string())),
        }
    }

    /// Move the oldest ready message of `queue` to unacked and return it.
    async fn claim(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut rows = self
            .handle
            .conn
            .query(
                "UPDATE queue_messages SET state = ?
                 WHERE tag = (
                    SELECT tag FROM queue_messages
                    WHERE queue = ? AND state = ?
                    ORDER BY tag LIMIT 1
                 )
                 RETURNING tag, body, headers",
                params![STATE_UNACKED, queue, STATE_READY],
            )
            .await
            .map_err(|e| DatabaseError::query_failed(format!("claim from {}: {}", queue, e)))?;

        let Some(row) = rows.next().await.map_err(DatabaseError::from)? else {
            return Ok(None);
        };
        let tag: i64 = row.get(0).map_err(DatabaseError::from)?;
        let body: Vec<u8> = row.get(1).map_err(DatabaseError::from)?;
        let headers: String = row.get(2).map_err(DatabaseError::from)?;
        Ok(Some(Delivery {
            queue: queue.to_string(),
            tag: tag as u64,
            body,
            headers: serde_json::from_str(&headers)?,
        }))
    }

    /// Map "no row changed" to an unknown delivery
    fn settled(delivery: &Delivery, changed: u64) -> Result<(), QueueError> {
        if changed == 0 {
            return Err(QueueError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for LibsqlQueue {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        self.handle
            .conn
            .execute("INSERT OR IGNORE INTO queues (name) VALUES (?)", params![queue])
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        headers: Headers,
    ) -> Result<(), QueueError> {
        self.ensure_declared(queue).await?;
        let headers = serde_json::to_string(&headers)?;
        self.handle
            .conn
            .execute(
                "INSERT INTO queue_messages (queue, body, headers, state) VALUES (?, ?, ?, ?)",
                params![queue, body, headers, STATE_READY],
            )
            .await
            .map_err(|e| DatabaseError::query_failed(format!("publish to {}: {}", queue, e)))?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, QueueError> {
        self.ensure_declared(queue).await?;
        loop {
            // Registered before the check so a publish in between is not missed
            let notified = self.notify.notified();
            if let Some(delivery) = self.claim(queue).await? {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let changed = self
            .handle
            .conn
            .execute(
                "DELETE FROM queue_messages WHERE tag = ? AND state = ?",
                params![delivery.tag as i64, STATE_UNACKED],
            )
            .await
            .map_err(DatabaseError::from)?;
        Self::settled(delivery, changed)
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        if !requeue {
            return self.ack(delivery).await;
        }
        let changed = self
            .handle
            .conn
            .execute(
                "UPDATE queue_messages SET state = ? WHERE tag = ? AND state = ?",
                params![STATE_READY, delivery.tag as i64, STATE_UNACKED],
            )
            .await
            .map_err(DatabaseError::from)?;
        Self::settled(delivery, changed)?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        self.ensure_declared(queue).await?;
        let mut rows = self
            .handle
            .conn
            .query(
                "SELECT COUNT(*) FROM queue_messages WHERE queue = ? AND state = ?",
                params![queue, STATE_READY],
            )
            .await
            .map_err(DatabaseError::from)?;
        let count: i64 = match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => row.get(0).map_err(DatabaseError::from)?,
            None => 0,
        };
        Ok(count as usize)
    }
}
