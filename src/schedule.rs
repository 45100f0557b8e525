//! Scheduled group refresh.
//!
//! Runs on a fixed cadence (daily in production) and sends fresh
//! instance-level traits straight to the group handler. The queue is skipped
//! because the schedule already decouples this work from user requests. A
//! failed run is logged and left for the next one.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::dispatch::EventHandlers;
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::model::{Context, TraitValue, Traits};
use crate::telemetry::metrics;

/// Default cadence for [`GroupRefreshJob`].
pub const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Instance-level traits for a scheduled refresh.
///
/// License flags absent from the context are left out. `todo_count` comes
/// from the to-do store when the caller has it.
pub fn refresh_traits(context: &Context, todo_count: Option<u64>) -> Traits {
    let mut traits = Traits::new();
    traits.insert("name".into(), TraitValue::from(context.cloud_id.as_str()));

    if let Some(license) = context.license {
        if let Some(active) = license.is_active {
            traits.insert("isActive".into(), TraitValue::from(active));
        }
        if let Some(evaluation) = license.is_evaluation {
            traits.insert("isEvaluation".into(), TraitValue::from(evaluation));
        }
    }

    traits.insert(
        "lastDailySync".into(),
        TraitValue::from(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
    );

    if let Some(count) = todo_count {
        traits.insert("todoCount".into(), TraitValue::from(count));
    }

    traits
}

/// Push a group update for the context's instance, bypassing the queue.
pub async fn refresh_group<H>(
    handlers: &H,
    resolver: &IdentityResolver,
    context: &Context,
    todo_count: Option<u64>,
) -> Result<()>
where
    H: EventHandlers + ?Sized,
{
    let group_id = resolver.resolve_group_id(context);
    let traits = refresh_traits(context, todo_count);

    let result = handlers.handle_group(&group_id, &traits).await;
    metrics::group_refreshes().add(
        1,
        &[KeyValue::new(
            "result",
            if result.is_ok() { "ok" } else { "error" },
        )],
    );
    result
}

/// Periodic driver for [`refresh_group`].
pub struct GroupRefreshJob<H> {
    handlers: H,
    resolver: IdentityResolver,
    context: Context,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl<H: EventHandlers> GroupRefreshJob<H> {
    pub fn new(handlers: H, resolver: IdentityResolver, context: Context) -> Self {
        Self {
            handlers,
            resolver,
            context,
            interval: DAILY,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Handle for stopping [`run`](Self::run) from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Refresh now, then every `interval`, until shutdown.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("group refresh job shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match refresh_group(&self.handlers, &self.resolver, &self.context, None).await {
                        Ok(()) => info!(group_id = %self.context.cloud_id, "group refreshed"),
                        Err(e) => warn!(group_id = %self.context.cloud_id, "group refresh failed: {e}"),
                    }
                }
            }
        }
    }
}
