//! Best-effort tracking off the request path.
//!
//! Business operations hand tracking jobs to a bounded channel and move on.
//! A single worker drains it. A full channel or a failed enqueue is logged
//! and the job dropped, so analytics can never block or fail the operation
//! that triggered it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::Tracker;
use crate::model::Context;

struct Job {
    context: Context,
    event: String,
}

#[derive(Clone)]
pub struct BackgroundTracker {
    tx: mpsc::Sender<Job>,
}

impl BackgroundTracker {
    /// Start the worker. It exits once every handle has been dropped and the
    /// channel is drained; await the returned handle to wait for that.
    pub fn spawn(tracker: Arc<Tracker>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = tracker.track(&job.context, &job.event).await {
                    warn!(event = %job.event, "dropping analytics bundle: {e}");
                }
            }
        });

        (Self { tx }, worker)
    }

    /// Queue a track call. Returns false if the job was dropped.
    pub fn submit(&self, context: Context, event: impl Into<String>) -> bool {
        let job = Job {
            context,
            event: event.into(),
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(event = %job.event, "analytics channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(event = %job.event, "analytics worker stopped, dropping event");
                false
            }
        }
    }
}
