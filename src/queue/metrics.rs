//! Metrics hook injected into each queue.

/// Observer notified of queue activity.
///
/// Every method is called with the queue lock held, so implementations must
/// be fast and must never block or call back into the queue. The `&mut self`
/// receivers are the lock: no extra synchronization is needed inside.
pub trait QueueMetrics<K>: Send {
    /// A key became dirty (newly scheduled, or re-added while in flight).
    fn add(&mut self, key: &K);

    /// A key was handed to a consumer.
    fn get(&mut self, key: &K);

    /// A consumer released a key.
    fn done(&mut self, key: &K);

    /// Periodic tick from the unfinished-work reporter.
    fn update_unfinished_work(&mut self);
}

/// Metrics hook that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl<K> QueueMetrics<K> for NoopMetrics {
    fn add(&mut self, _key: &K) {}
    fn get(&mut self, _key: &K) {}
    fn done(&mut self, _key: &K) {}
    fn update_unfinished_work(&mut self) {}
}
