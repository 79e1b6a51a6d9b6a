//! Persisted mirror of the in-memory signal queue.
//!
//! The in-memory FIFO in the slot manager is authoritative; this mirror
//! exists so a restart can rebuild it.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::types::QueuedSignal;
use crate::Result;

pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, queued: &QueuedSignal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_queue (id, signal_id, payload, enqueued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(queued.id)
        .bind(queued.signal_id)
        .bind(&queued.payload)
        .bind(queued.enqueued_at)
        .bind(queued.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM signal_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM signal_queue WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// All queued signals in FIFO order.
    pub async fn list_all(&self) -> Result<Vec<QueuedSignal>> {
        let rows = sqlx::query("SELECT * FROM signal_queue ORDER BY enqueued_at ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| QueuedSignal {
                id: r.get("id"),
                signal_id: r.get("signal_id"),
                payload: r.get("payload"),
                enqueued_at: r.get("enqueued_at"),
                expires_at: r.get("expires_at"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl crate::stores::QueueStore for QueueRepository {
    async fn insert(&self, queued: &QueuedSignal) -> Result<()> {
        QueueRepository::insert(self, queued).await
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        QueueRepository::remove(self, id).await
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        QueueRepository::remove_expired(self, now).await
    }

    async fn list_all(&self) -> Result<Vec<QueuedSignal>> {
        QueueRepository::list_all(self).await
    }
}
