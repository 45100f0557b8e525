//! Event bundler: turns one tracked action into an identify/group/track bundle.
//!
//! Every track travels with an identify and a group built from the same
//! context. All three are pushed in a single call, so the destination's view
//! of the user and group is never older than the latest tracked action.
//! Nothing here retries. A failed push is returned to the caller.

pub mod background;

pub use background::BackgroundTracker;

use std::sync::Arc;

use opentelemetry::KeyValue;
use serde::Deserialize;
use tracing::debug;

use crate::dispatch::EventHandlers;
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::model::{Context, Envelope, name_traits};
use crate::queue::QueueBoundary;
use crate::telemetry::metrics;

/// Fixed event names for the backend CRUD resolvers.
pub mod events {
    pub const GET_ALL: &str = "Backend: Get All";
    pub const CREATE: &str = "Backend: Create";
    pub const UPDATE: &str = "Backend: Update";
    pub const DELETE: &str = "Backend: Delete";
    pub const DELETE_ALL: &str = "Backend: Delete All";
}

/// Body of a frontend-triggered track call.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackEventRequest {
    pub event: String,
}

pub struct Tracker {
    resolver: IdentityResolver,
    queue: Arc<dyn QueueBoundary>,
}

impl Tracker {
    pub fn new(resolver: IdentityResolver, queue: Arc<dyn QueueBoundary>) -> Self {
        Self { resolver, queue }
    }

    /// Build the identify, group, and track envelopes for one action.
    pub fn bundle(&self, context: &Context, event: &str) -> [Envelope; 3] {
        let user_id = self.resolver.resolve_user_id(context);
        let group_id = self.resolver.resolve_group_id(context);

        [
            Envelope::Identify {
                traits: name_traits(user_id.as_str()),
                user_id: user_id.clone(),
                group_id: group_id.clone(),
            },
            Envelope::Group {
                traits: name_traits(group_id.as_str()),
                group_id,
            },
            Envelope::Track {
                user_id,
                event: event.to_string(),
            },
        ]
    }

    /// Enqueue the bundle for `event` in one push.
    pub async fn track(&self, context: &Context, event: &str) -> Result<()> {
        let items = self
            .bundle(context, event)
            .iter()
            .map(Envelope::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;

        let result = self.queue.push(&items).await;
        metrics::bundles_enqueued().add(
            1,
            &[
                KeyValue::new("event", event.to_string()),
                KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
            ],
        );
        let ids = result?;
        debug!(event, queue = self.queue.name(), ?ids, "analytics bundle enqueued");
        Ok(())
    }

    /// Frontend-triggered track call.
    pub async fn track_event(&self, context: &Context, request: &TrackEventRequest) -> Result<()> {
        self.track(context, &request.event).await
    }

    pub async fn track_get_all(&self, context: &Context) -> Result<()> {
        self.track(context, events::GET_ALL).await
    }

    pub async fn track_create(&self, context: &Context) -> Result<()> {
        self.track(context, events::CREATE).await
    }

    pub async fn track_update(&self, context: &Context) -> Result<()> {
        self.track(context, events::UPDATE).await
    }

    pub async fn track_delete(&self, context: &Context) -> Result<()> {
        self.track(context, events::DELETE).await
    }

    pub async fn track_delete_all(&self, context: &Context) -> Result<()> {
        self.track(context, events::DELETE_ALL).await
    }
}

/// Send an identify call right away, skipping the queue.
///
/// Rarely needed: every tracked action already carries one.
pub async fn identify<H>(handlers: &H, resolver: &IdentityResolver, context: &Context) -> Result<()>
where
    H: EventHandlers + ?Sized,
{
    let user_id = resolver.resolve_user_id(context);
    let group_id = resolver.resolve_group_id(context);
    handlers
        .handle_identify(&user_id, &group_id, &name_traits(user_id.as_str()))
        .await
}

/// Send a group call right away, skipping the queue.
pub async fn group<H>(handlers: &H, resolver: &IdentityResolver, context: &Context) -> Result<()>
where
    H: EventHandlers + ?Sized,
{
    let group_id = resolver.resolve_group_id(context);
    handlers
        .handle_group(&group_id, &name_traits(group_id.as_str()))
        .await
}
