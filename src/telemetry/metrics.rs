//! Metric instrument factories for todo-analytics.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("todo-analytics")
}

/// Counter: bundles handed to the queue.
/// Labels: `event`, `result` ("ok" | "error").
pub fn bundles_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("analytics.bundles.enqueued")
        .with_description("Number of identify/group/track bundles pushed to the queue")
        .build()
}

/// Counter: queue-level operations (create, push, read, ack, release).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("analytics.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: envelopes handed to the transport dispatcher.
/// Labels: `endpoint`, `mode` ("send" | "debug"), `result` ("ok" | "error").
pub fn envelopes_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("analytics.envelopes.dispatched")
        .with_description("Number of envelopes dispatched to the analytics API")
        .build()
}

/// Counter: deliveries discarded because they could not be routed.
/// Labels: `reason`.
pub fn envelopes_unroutable() -> Counter<u64> {
    meter()
        .u64_counter("analytics.envelopes.unroutable")
        .with_description("Deliveries with no matching handler")
        .build()
}

/// Histogram: dispatch duration in milliseconds.
/// Labels: `endpoint`.
pub fn dispatch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("analytics.dispatch.duration_ms")
        .with_description("Analytics dispatch duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: scheduled group refreshes.
/// Labels: `result`.
pub fn group_refreshes() -> Counter<u64> {
    meter()
        .u64_counter("analytics.group.refreshes")
        .with_description("Number of scheduled group refresh runs")
        .build()
}
