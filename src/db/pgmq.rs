//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send_batch, pgmq.read,
//! pgmq.archive, pgmq.set_vt.

use crate::error::Result;
use crate::queue::record_operation;
use sqlx::types::Json;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        record_operation(queue_name, "create");
        Ok(())
    }

    /// Send several messages in one statement. Either all land or none do.
    /// Returns the message IDs in input order.
    pub async fn send_batch(
        &self,
        queue_name: &str,
        payloads: &[serde_json::Value],
    ) -> Result<Vec<i64>> {
        let bodies: Vec<Json<&serde_json::Value>> = payloads.iter().map(Json).collect();
        let ids: Vec<i64> = sqlx::query_scalar("SELECT * FROM pgmq.send_batch($1, $2::jsonb[])")
            .bind(queue_name)
            .bind(bodies)
            .fetch_all(&self.pool)
            .await?;
        record_operation(queue_name, "push");
        Ok(ids)
    }

    /// Read the next message from a queue, hiding it for `vt_seconds`.
    /// Returns None if the queue is empty.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        });

        record_operation(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );
        Ok(msg)
    }

    /// Archive a message (moves to the archive table, kept for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        record_operation(queue_name, "ack");
        Ok(())
    }

    /// Hide a message for `vt_seconds` from now. `0` makes it readable now.
    pub async fn set_visibility(&self, queue_name: &str, msg_id: i64, vt_seconds: i32) -> Result<()> {
        sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(queue_name)
            .bind(msg_id)
            .bind(vt_seconds)
            .execute(&self.pool)
            .await?;
        record_operation(queue_name, "release");
        Ok(())
    }
}
