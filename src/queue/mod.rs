//! The deduplicating work queue.
//!
//! Three pieces of bookkeeping live behind one mutex:
//!
//! - `queue`: keys waiting for a consumer, oldest first.
//! - `dirty`: keys that need (re)processing. Every queued key is dirty.
//! - `processing`: keys checked out by `get` and not yet released by `done`.
//!
//! `queue` and `processing` never share a key. A key added while it is being
//! processed only becomes dirty; `done` moves it back onto the tail of the
//! queue. That is what lets a key be re-announced any number of times while
//! still never being handed to two consumers at once.

mod guard;
mod metrics;
mod reporter;

pub use guard::Processing;
pub use metrics::{NoopMetrics, QueueMetrics};

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::clock::{Clock, RealClock};

/// Default period of the unfinished-work reporter.
pub const DEFAULT_UNFINISHED_WORK_PERIOD: Duration = Duration::from_millis(500);

/// Construction options for a [`Queue`].
pub struct QueueConfig<K> {
    /// Name used in logs, thread names and metric attributes.
    pub name: String,
    /// Time source for the unfinished-work reporter.
    pub clock: Arc<dyn Clock>,
    /// Observer called on add/get/done and on each reporter tick.
    pub metrics: Box<dyn QueueMetrics<K>>,
    /// Reporter period. Zero disables the reporter.
    pub unfinished_work_period: Duration,
}

impl<K: 'static> Default for QueueConfig<K> {
    fn default() -> Self {
        Self {
            name: String::new(),
            clock: Arc::new(RealClock),
            metrics: Box::new(NoopMetrics),
            unfinished_work_period: DEFAULT_UNFINISHED_WORK_PERIOD,
        }
    }
}

impl<K: 'static> QueueConfig<K> {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: impl QueueMetrics<K> + 'static) -> Self {
        self.metrics = Box::new(metrics);
        self
    }

    pub fn unfinished_work_period(mut self, period: Duration) -> Self {
        self.unfinished_work_period = period;
        self
    }
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
    drain: bool,
    metrics: Box<dyn QueueMetrics<K>>,
}

pub(crate) struct Shared<K> {
    name: String,
    state: Mutex<State<K>>,
    cond: Condvar,
}

/// A deduplicating, blocking, thread-safe work queue.
///
/// Cloning yields another handle to the same queue.
pub struct Queue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for Queue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> Queue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create an unnamed queue with no metrics and the real clock.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue from explicit configuration.
    ///
    /// Starts the unfinished-work reporter thread unless the configured
    /// period is zero.
    pub fn with_config(config: QueueConfig<K>) -> Self {
        let shared = Arc::new(Shared {
            name: config.name,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
                drain: false,
                metrics: config.metrics,
            }),
            cond: Condvar::new(),
        });

        if !config.unfinished_work_period.is_zero() {
            reporter::spawn(
                Arc::downgrade(&shared),
                config.clock.as_ref(),
                config.unfinished_work_period,
            );
        }

        Self { shared }
    }

    /// Schedule `key` for processing.
    ///
    /// No-op if the queue is shutting down or the key is already dirty. A key
    /// that is being processed is marked dirty and re-queued by `done`.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }

        state.metrics.add(&key);
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }

        state.queue.push_back(key);
        self.shared.cond.notify_one();
    }

    /// Number of keys waiting for a consumer.
    ///
    /// A snapshot only: it can be stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Block until a key is available and check it out.
    ///
    /// Returns `None` once the queue is shutting down and nothing is left
    /// queued; consumers should treat that as a normal exit. Every key
    /// returned must be handed back with [`Queue::done`].
    pub fn get(&self) -> Option<K> {
        let mut state = self.lock();
        while state.queue.is_empty() && !state.shutting_down {
            self.shared.cond.wait(&mut state);
        }

        let key = state.queue.pop_front()?;
        state.metrics.get(&key);
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Like [`Queue::get`], but the returned guard calls `done` when dropped,
    /// including while unwinding from a panic.
    pub fn get_guarded(&self) -> Option<Processing<K>> {
        self.get().map(|key| Processing::new(self.clone(), key))
    }

    /// Release a key checked out by `get`.
    ///
    /// If the key was added again while it was being processed, it goes back
    /// on the tail of the queue. Releasing a key that is not being processed
    /// does nothing.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        if !state.processing.remove(key) {
            return;
        }
        state.metrics.done(key);

        let requeued = state.dirty.contains(key);
        if requeued {
            state.queue.push_back(key.clone());
        }

        if state.processing.is_empty() {
            // A drain waiter may be parked alongside consumers.
            self.shared.cond.notify_all();
        } else if requeued {
            self.shared.cond.notify_one();
        }
    }

    /// Stop accepting work and wake every blocked consumer.
    ///
    /// Keys already queued still drain through `get`. Idempotent.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.drain = false;
        if !state.shutting_down {
            debug!(queue = %self.shared.name, "shutting down");
        }
        state.shutting_down = true;
        self.shared.cond.notify_all();
    }

    /// Shut down, then block until every in-flight key has been released.
    ///
    /// Keys still waiting in the queue are not waited for. A concurrent
    /// [`Queue::shut_down`] ends the wait early.
    pub fn shut_down_with_drain(&self) {
        let mut state = self.lock();
        state.drain = true;
        state.shutting_down = true;
        self.shared.cond.notify_all();

        debug!(
            queue = %self.shared.name,
            in_flight = state.processing.len(),
            "shutting down, draining in-flight work"
        );
        while state.drain && !state.processing.is_empty() {
            self.shared.cond.wait(&mut state);
        }
        debug!(queue = %self.shared.name, "drain finished");
    }

    pub fn shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.shared.state.lock()
    }
}

impl<K> Default for Queue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for Queue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}
