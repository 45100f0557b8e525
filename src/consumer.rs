//! Consumer side of the queue: route each delivery to its handler.
//!
//! [`Router::on_event`] handles a single delivery. [`Consumer`] polls the
//! queue, acks what succeeded, and releases what failed so the queue
//! delivers it again after its visibility timeout. That redelivery is the
//! only retry in the pipeline. There is no circuit breaker or dead-letter
//! queue here.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, warn};

use crate::dispatch::EventHandlers;
use crate::error::Result;
use crate::model::{Envelope, Unroutable};
use crate::queue::{Delivery, QueueBoundary};
use crate::telemetry::{metrics, pipeline};

/// What happened to a delivery that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// The matching handler ran.
    Handled(&'static str),
    /// Nothing could handle it. Logged and dropped; redelivery would not help.
    Discarded(Unroutable),
}

pub struct Router<H> {
    handlers: H,
}

impl<H: EventHandlers> Router<H> {
    pub fn new(handlers: H) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &H {
        &self.handlers
    }

    /// Route one message body. Handler errors propagate.
    pub async fn on_event(&self, body: &serde_json::Value) -> Result<Routed> {
        let envelope = match Envelope::decode(body) {
            Ok(envelope) => envelope,
            Err(reason) => {
                warn!("unable to route delivery, discarding: {reason}");
                metrics::envelopes_unroutable().add(
                    1,
                    &[KeyValue::new("reason", unroutable_label(&reason))],
                );
                return Ok(Routed::Discarded(reason));
            }
        };

        self.route(&envelope).await?;
        Ok(Routed::Handled(envelope.kind()))
    }

    /// Invoke the handler for an already-decoded envelope.
    pub async fn route(&self, envelope: &Envelope) -> Result<()> {
        match envelope {
            Envelope::Identify {
                user_id,
                group_id,
                traits,
            } => {
                self.handlers
                    .handle_identify(user_id, group_id, traits)
                    .await
            }
            Envelope::Group { group_id, traits } => {
                self.handlers.handle_group(group_id, traits).await
            }
            Envelope::Track { user_id, event } => {
                self.handlers.handle_track_event(user_id, event).await
            }
        }
    }
}

fn unroutable_label(reason: &Unroutable) -> &'static str {
    match reason {
        Unroutable::MissingType => "missing_type",
        Unroutable::UnknownType(_) => "unknown_type",
        Unroutable::Malformed { .. } => "malformed",
    }
}

// ---------------------------------------------------------------------------
// Consumer loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Counts from one [`Consumer::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub handled: usize,
    pub discarded: usize,
    pub released: usize,
}

pub struct Consumer<H> {
    queue: Arc<dyn QueueBoundary>,
    router: Arc<Router<H>>,
    config: ConsumerConfig,
    shutdown: Arc<Notify>,
}

impl<H> Clone for Consumer<H> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            router: Arc::clone(&self.router),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<H: EventHandlers> Consumer<H> {
    pub fn new(queue: Arc<dyn QueueBoundary>, router: Router<H>, config: ConsumerConfig) -> Self {
        Self {
            queue,
            router: Arc::new(router),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the consumer loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Poll until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(queue = self.queue.name(), "analytics consumer started");

        loop {
            if let Err(e) = self.drain().await {
                error!("analytics consumer error: {e}");
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("analytics consumer shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Process deliveries until a read comes back empty.
    ///
    /// A released message stays hidden for the queue's visibility timeout, so
    /// the pass moves on to the messages behind it.
    pub async fn drain(&self) -> Result<DrainStats> {
        let mut stats = DrainStats::default();

        while let Some(delivery) = self.queue.read().await? {
            match self.process(&delivery).await? {
                Some(Routed::Handled(_)) => stats.handled += 1,
                Some(Routed::Discarded(_)) => stats.discarded += 1,
                None => stats.released += 1,
            }
        }

        Ok(stats)
    }

    /// Handle one delivery. Returns `None` when it was released for redelivery.
    pub async fn process(&self, delivery: &Delivery) -> Result<Option<Routed>> {
        let span =
            pipeline::start_delivery_span(self.queue.name(), delivery.msg_id, delivery.read_ct);
        if let Some(kind) = delivery.body.get("type").and_then(|t| t.as_str()) {
            pipeline::record_envelope_type(&span, kind);
        }

        async {
            match self.router.on_event(&delivery.body).await {
                Ok(routed) => {
                    self.queue.ack(delivery.msg_id).await?;
                    debug!(msg_id = delivery.msg_id, ?routed, "delivery acked");
                    Ok(Some(routed))
                }
                Err(e) => {
                    warn!(
                        msg_id = delivery.msg_id,
                        read_ct = delivery.read_ct,
                        "delivery failed, releasing for redelivery: {e}"
                    );
                    self.queue.release(delivery.msg_id).await?;
                    Ok(None)
                }
            }
        }
        .instrument(span)
        .await
    }
}
