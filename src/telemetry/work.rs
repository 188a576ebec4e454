//! Worker span helpers.
//!
//! Spans for consumer loops pulling keys off a queue.

use tracing::Span;

/// Start a span covering one worker's consumer loop.
///
/// `worker.processed` is declared empty and filled in by
/// [`record_worker_finished`].
pub fn start_worker_span(queue: &str, worker: usize) -> Span {
    tracing::info_span!(
        "workq.worker",
        "workq.queue" = queue,
        "workq.worker" = worker,
        "workq.processed" = tracing::field::Empty,
    )
}

/// Record that a key finished processing, as a `debug` event in `span`.
pub fn record_key_processed(span: &Span, key: &dyn std::fmt::Display) {
    span.in_scope(|| {
        tracing::debug!(key = %key, "key_processed");
    });
}

/// Record the number of keys a worker processed before its loop ended.
pub fn record_worker_finished(span: &Span, processed: u64) {
    span.record("workq.processed", processed);
    span.in_scope(|| {
        tracing::info!(processed, "worker_finished");
    });
}
