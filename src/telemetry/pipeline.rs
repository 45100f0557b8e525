//! Span helpers for envelopes moving through the pipeline.

use tracing::Span;

/// Start a span for one queue delivery.
///
/// `envelope.type` is declared empty and filled via [`record_envelope_type`]
/// once the body has been decoded.
pub fn start_delivery_span(queue: &str, msg_id: i64, read_ct: i32) -> Span {
    tracing::info_span!(
        "analytics.deliver",
        "queue.name" = queue,
        "queue.msg_id" = msg_id,
        "queue.read_ct" = read_ct,
        "envelope.type" = tracing::field::Empty,
    )
}

/// Record the decoded envelope type on a delivery span.
pub fn record_envelope_type(span: &Span, kind: &str) {
    span.record("envelope.type", kind);
}

/// Start a span for a single dispatch to the analytics API.
pub fn start_dispatch_span(endpoint: &str, debug_mode: bool) -> Span {
    let mode = if debug_mode { "debug" } else { "send" };
    tracing::info_span!(
        "analytics.dispatch",
        "analytics.endpoint" = endpoint,
        "analytics.mode" = mode,
        "http.status" = tracing::field::Empty,
    )
}

/// Record the HTTP status on a dispatch span.
pub fn record_status(span: &Span, status: u16) {
    span.record("http.status", status);
}
