//! OpenTelemetry metrics for work queues.
//!
//! Instruments come from the globally-registered `MeterProvider` under the
//! `"workq"` meter. Without a provider installed they are no-ops, so
//! [`OtelQueueMetrics`] is safe to wire in unconditionally.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};

use crate::clock::Clock;
use crate::queue::QueueMetrics;

/// Returns the shared meter for workq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("workq")
}

/// Up-down counter: keys dirty and not yet handed out.
/// Labels: `name`.
pub fn queue_depth() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("workq.queue.depth")
        .with_description("Current depth of the work queue")
        .build()
}

/// Counter: keys scheduled (dedup hits excluded).
/// Labels: `name`.
pub fn queue_adds() -> Counter<u64> {
    meter()
        .u64_counter("workq.queue.adds")
        .with_description("Number of keys added to the work queue")
        .build()
}

/// Histogram: seconds a key waited between add and get.
/// Labels: `name`.
pub fn queue_latency() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.queue.latency")
        .with_description("Time a key spends waiting in the queue")
        .with_unit("s")
        .build()
}

/// Histogram: seconds between get and done.
/// Labels: `name`.
pub fn work_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.queue.work_duration")
        .with_description("Time spent processing a key")
        .with_unit("s")
        .build()
}

/// Gauge: summed age of all in-flight work, in seconds.
/// Labels: `name`.
pub fn unfinished_work() -> Gauge<f64> {
    meter()
        .f64_gauge("workq.queue.unfinished_work")
        .with_description("Seconds of work in progress not yet observed by work_duration")
        .with_unit("s")
        .build()
}

/// Gauge: age of the oldest in-flight key, in seconds.
/// Labels: `name`.
pub fn longest_running_processor() -> Gauge<f64> {
    meter()
        .f64_gauge("workq.queue.longest_running_processor")
        .with_description("Age of the longest running processor")
        .with_unit("s")
        .build()
}

/// [`QueueMetrics`] backed by OpenTelemetry instruments.
///
/// Tracks when each key was added and when processing started so it can
/// report queue latency, work duration and unfinished work.
pub struct OtelQueueMetrics<K> {
    clock: Arc<dyn Clock>,
    attrs: [KeyValue; 1],

    depth: UpDownCounter<i64>,
    adds: Counter<u64>,
    latency: Histogram<f64>,
    work_duration: Histogram<f64>,
    unfinished_work: Gauge<f64>,
    longest_running: Gauge<f64>,

    added_at: HashMap<K, Instant>,
    processing_since: HashMap<K, Instant>,
}

impl<K> OtelQueueMetrics<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            attrs: [KeyValue::new("name", name.into())],
            depth: queue_depth(),
            adds: queue_adds(),
            latency: queue_latency(),
            work_duration: work_duration(),
            unfinished_work: unfinished_work(),
            longest_running: longest_running_processor(),
            added_at: HashMap::new(),
            processing_since: HashMap::new(),
        }
    }

    /// Number of keys currently being processed.
    pub fn in_flight(&self) -> usize {
        self.processing_since.len()
    }

    /// Summed and maximum age of in-flight work, in seconds.
    fn unfinished(&self) -> (f64, f64) {
        let now = self.clock.now();
        self.processing_since
            .values()
            .map(|start| now.saturating_duration_since(*start).as_secs_f64())
            .fold((0.0, 0.0), |(total, oldest), age| {
                (total + age, f64::max(oldest, age))
            })
    }
}

impl<K> QueueMetrics<K> for OtelQueueMetrics<K>
where
    K: Eq + Hash + Clone + Send,
{
    fn add(&mut self, key: &K) {
        self.adds.add(1, &self.attrs);
        self.depth.add(1, &self.attrs);
        if !self.added_at.contains_key(key) {
            self.added_at.insert(key.clone(), self.clock.now());
        }
    }

    fn get(&mut self, key: &K) {
        let now = self.clock.now();
        self.depth.add(-1, &self.attrs);
        if let Some(added) = self.added_at.remove(key) {
            self.latency
                .record(now.saturating_duration_since(added).as_secs_f64(), &self.attrs);
        }
        self.processing_since.insert(key.clone(), now);
    }

    fn done(&mut self, key: &K) {
        if let Some(start) = self.processing_since.remove(key) {
            let elapsed = self.clock.now().saturating_duration_since(start);
            self.work_duration.record(elapsed.as_secs_f64(), &self.attrs);
        }
    }

    fn update_unfinished_work(&mut self) {
        let (total, oldest) = self.unfinished();
        self.unfinished_work.record(total, &self.attrs);
        self.longest_running.record(oldest, &self.attrs);
    }
}
