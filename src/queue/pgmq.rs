//! Durable queue on Postgres + pgmq.
//!
//! Ack archives the message. A failed delivery stays hidden for another full
//! visibility timeout, as does one whose consumer died mid-delivery. pgmq
//! hands it out again once that lapses, and reads in the meantime move on to
//! the messages behind it.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Delivery, QueueBoundary};
use crate::db::Db;
use crate::error::Result;

pub struct PgmqQueue {
    db: Arc<Db>,
    name: String,
    visibility_timeout: i32,
}

impl PgmqQueue {
    pub fn new(db: Arc<Db>, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            visibility_timeout: 60,
        }
    }

    /// Seconds a read or released message stays hidden before pgmq redelivers it.
    pub fn visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = seconds;
        self
    }

    /// Install pgmq and create the queue. Safe to call repeatedly.
    pub async fn ensure(&self) -> Result<()> {
        self.db.ensure_pgmq().await?;
        self.db.create_queue(&self.name).await
    }
}

#[async_trait]
impl QueueBoundary for PgmqQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, items: &[serde_json::Value]) -> Result<Vec<i64>> {
        self.db.send_batch(&self.name, items).await
    }

    async fn read(&self) -> Result<Option<Delivery>> {
        let msg = self
            .db
            .read_from_queue(&self.name, self.visibility_timeout)
            .await?;
        Ok(msg.map(|m| Delivery {
            msg_id: m.msg_id,
            read_ct: m.read_ct,
            body: m.message,
        }))
    }

    async fn ack(&self, msg_id: i64) -> Result<()> {
        self.db.archive_message(&self.name, msg_id).await
    }

    async fn release(&self, msg_id: i64) -> Result<()> {
        self.db
            .set_visibility(&self.name, msg_id, self.visibility_timeout)
            .await
    }
}
