//! Scoped checkout of a key.

use std::hash::Hash;
use std::ops::Deref;

use super::Queue;

/// A key checked out with [`Queue::get_guarded`].
///
/// Dropping the guard releases the key with [`Queue::done`], so a worker
/// that panics cannot leave the key stuck in the processing set.
pub struct Processing<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    queue: Queue<K>,
    key: K,
}

impl<K> Processing<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub(super) fn new(queue: Queue<K>, key: K) -> Self {
        Self { queue, key }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Release the key now. Same as dropping the guard.
    pub fn finish(self) {}
}

impl<K> Deref for Processing<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    type Target = K;

    fn deref(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for Processing<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}

impl<K> std::fmt::Debug for Processing<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processing")
            .field("queue", &self.queue.name())
            .field("key", &self.key)
            .finish()
    }
}
