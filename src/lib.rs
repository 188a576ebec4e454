//! # workq
//!
//! Deduplicating, blocking, thread-safe work queue for controller loops.
//!
//! Keys (not payloads) are queued. A key re-added while a consumer holds it
//! is processed once more after `done`, and is never handed to two consumers
//! at the same time. Metrics are injected per queue, time comes from an
//! injectable [`clock::Clock`].

pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod telemetry;

pub use queue::{NoopMetrics, Processing, Queue, QueueConfig, QueueMetrics};
