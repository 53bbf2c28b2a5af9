//! Postgres-backed message queue feeding the realm pipeline.
//!
//! Producers `enqueue` a `{realm?, id}` payload; workers `claim_batch` with
//! `FOR UPDATE SKIP LOCKED`, hand each message to the dispatcher in order and
//! `ack` it. The dispatcher never reports failure, so every claimed message
//! ends up `done`; re-delivery only happens through `requeue_stale`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::error::StorageResult;
use crate::realm::{RealmIngestor, RealmMessage};

/// A message claimed by this worker.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub id: i64,
    pub payload: Value,
    pub attempts: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    /// Decode the payload; anything unreadable becomes an empty (no-op) message.
    pub fn message(&self) -> RealmMessage {
        match serde_json::from_value(self.payload.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!(queue_id = self.id, error = %e, "unreadable realm message payload");
                RealmMessage::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub done: i64,
}

#[derive(Clone)]
pub struct RealmQueue {
    pool: PgPool,
}

impl RealmQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Producer side: seed ingestion for one parent.
    pub async fn enqueue(&self, realm: Option<&str>, id: &str) -> StorageResult<i64> {
        let payload = serde_json::to_value(RealmMessage::new(realm.map(str::to_string), id))?;
        let queue_id: i64 = sqlx::query_scalar(
            "INSERT INTO realm_queue (payload) VALUES ($1) RETURNING id",
        )
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        info!(queue_id, realm = realm.unwrap_or_default(), id, "enqueued realm message");
        Ok(queue_id)
    }

    /// Mark up to `limit` queued messages as running for `worker_id`, oldest first.
    pub async fn claim_batch(&self, worker_id: &str, limit: i64) -> StorageResult<Vec<QueuedMessage>> {
        let rows = sqlx::query(
            "UPDATE realm_queue q \
             SET status = 'running', locked_by = $1, locked_at = now(), attempts = q.attempts + 1 \
             FROM ( \
                 SELECT id FROM realm_queue \
                 WHERE status = 'queued' \
                 ORDER BY id ASC \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT $2 \
             ) picked \
             WHERE q.id = picked.id \
             RETURNING q.id, q.payload, q.attempts, q.enqueued_at",
        )
        .bind(worker_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut batch = rows
            .into_iter()
            .map(|row| {
                Ok(QueuedMessage {
                    id: row.try_get("id")?,
                    payload: row.try_get("payload")?,
                    attempts: row.try_get("attempts")?,
                    enqueued_at: row.try_get("enqueued_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        // RETURNING order is unspecified.
        batch.sort_by_key(|m| m.id);
        Ok(batch)
    }

    pub async fn ack(&self, queue_id: i64) -> StorageResult<()> {
        sqlx::query(
            "UPDATE realm_queue SET status = 'done', finished_at = now(), locked_by = NULL WHERE id = $1",
        )
        .bind(queue_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Put `running` messages locked longer than `older_than_minutes` back in the queue.
    pub async fn requeue_stale(&self, older_than_minutes: i64) -> StorageResult<u64> {
        let res = sqlx::query(
            "UPDATE realm_queue \
             SET status = 'queued', locked_by = NULL, locked_at = NULL \
             WHERE status = 'running' AND locked_at < now() - make_interval(mins => $1::int)",
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn stats(&self) -> StorageResult<QueueStats> {
        let rows = sqlx::query("SELECT status, count(*) AS n FROM realm_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.as_str() {
                "queued" => stats.queued = n,
                "running" => stats.running = n,
                "done" => stats.done = n,
                other => warn!(status = other, n, "unknown queue status"),
            }
        }
        Ok(stats)
    }
}

/// Run each message of a batch through the dispatcher, one after another.
/// Returns the ids that were handled, in order; all of them are ready to ack.
pub async fn consume_batch(ingestor: &RealmIngestor, batch: &[QueuedMessage]) -> Vec<i64> {
    let mut handled = Vec::with_capacity(batch.len());
    for queued in batch {
        let message = queued.message();
        info!(
            queue_id = queued.id,
            attempts = queued.attempts,
            realm = message.realm.as_deref().unwrap_or_default(),
            id = message.id.as_deref().unwrap_or_default(),
            "handling realm message"
        );
        ingestor.handle(&message).await;
        handled.push(queued.id);
    }
    handled
}
