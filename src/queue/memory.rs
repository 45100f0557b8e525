//! In-process queue with at-least-once semantics.
//!
//! Mirrors pgmq: reads hand out the lowest visible message ID, and a read
//! or released message stays hidden until its visibility timeout lapses.
//! Bodies are stored as encoded JSON text so a delivery goes through the same
//! encode/decode step a real queue imposes. Used by tests and by the CLI when
//! no database is configured.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Delivery, QueueBoundary, record_operation};
use crate::error::{Error, Result};

struct Stored {
    read_ct: i32,
    visible_at: Instant,
    body: String,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    messages: BTreeMap<i64, Stored>,
}

pub struct MemoryQueue {
    name: String,
    capacity: Option<usize>,
    visibility_timeout: Duration,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            visibility_timeout: Duration::from_secs(60),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Reject pushes that would hold more than `capacity` messages.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// How long a read or released message stays hidden.
    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Messages a read would return right now.
    pub fn ready_len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|inner| {
                inner
                    .messages
                    .values()
                    .filter(|m| m.visible_at <= now)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Messages read or released but not yet visible again.
    pub fn hidden_len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|inner| {
                inner
                    .messages
                    .values()
                    .filter(|m| m.visible_at > now)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.lock()
            .map(|inner| inner.messages.is_empty())
            .unwrap_or(true)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Other(format!("queue {} lock poisoned", self.name)))
    }
}

#[async_trait]
impl QueueBoundary for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, items: &[serde_json::Value]) -> Result<Vec<i64>> {
        // Encode everything before touching the queue so a bad item rejects the batch.
        let bodies = items
            .iter()
            .map(serde_json::to_string)
            .collect::<serde_json::Result<Vec<_>>>()?;

        let mut inner = self.lock()?;
        if let Some(cap) = self.capacity {
            let held = inner.messages.len();
            if held + bodies.len() > cap {
                return Err(Error::QueueRejected(format!(
                    "queue {} is full ({held}/{cap})",
                    self.name
                )));
            }
        }

        let now = Instant::now();
        let mut ids = Vec::with_capacity(bodies.len());
        for body in bodies {
            inner.next_id += 1;
            let msg_id = inner.next_id;
            inner.messages.insert(
                msg_id,
                Stored {
                    read_ct: 0,
                    visible_at: now,
                    body,
                },
            );
            ids.push(msg_id);
        }
        drop(inner);

        record_operation(&self.name, "push");
        Ok(ids)
    }

    async fn read(&self) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let Some((&msg_id, stored)) = inner
            .messages
            .iter_mut()
            .find(|(_, m)| m.visible_at <= now)
        else {
            drop(inner);
            record_operation(&self.name, "read_empty");
            return Ok(None);
        };

        stored.read_ct += 1;
        stored.visible_at = now + self.visibility_timeout;
        let delivery = Delivery {
            msg_id,
            read_ct: stored.read_ct,
            body: serde_json::from_str(&stored.body)?,
        };
        drop(inner);

        record_operation(&self.name, "read");
        Ok(Some(delivery))
    }

    async fn ack(&self, msg_id: i64) -> Result<()> {
        self.lock()?.messages.remove(&msg_id);
        record_operation(&self.name, "ack");
        Ok(())
    }

    async fn release(&self, msg_id: i64) -> Result<()> {
        let visible_at = Instant::now() + self.visibility_timeout;
        if let Some(stored) = self.lock()?.messages.get_mut(&msg_id) {
            stored.visible_at = visible_at;
        }
        record_operation(&self.name, "release");
        Ok(())
    }
}
