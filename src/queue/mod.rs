//! Queue boundary between the producer and the consumer.
//!
//! Contract the pipeline relies on:
//! - `push` takes an ordered batch and is all-or-nothing.
//! - Delivery is at-least-once. A message that is read but never acked
//!   comes back once its visibility timeout lapses. `release` restarts that
//!   timeout, so the failed message waits while later ones are read.
//! - Nothing is promised about order. Each delivery stands alone.

pub mod memory;
pub mod pgmq;

pub use memory::MemoryQueue;
pub use pgmq::PgmqQueue;

use async_trait::async_trait;
use opentelemetry::KeyValue;

use crate::error::Result;
use crate::telemetry::metrics;

/// A message handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub msg_id: i64,
    /// How many times this message has been read, this read included.
    pub read_ct: i32,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait QueueBoundary: Send + Sync {
    fn name(&self) -> &str;

    /// Durably enqueue `items` as one unit. Returns their message IDs.
    async fn push(&self, items: &[serde_json::Value]) -> Result<Vec<i64>>;

    /// Take the next visible message, if any.
    async fn read(&self) -> Result<Option<Delivery>>;

    /// Processing succeeded; never deliver this message again.
    async fn ack(&self, msg_id: i64) -> Result<()>;

    /// Processing failed; redeliver after the visibility timeout.
    async fn release(&self, msg_id: i64) -> Result<()>;
}

pub(crate) fn record_operation(queue: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}
