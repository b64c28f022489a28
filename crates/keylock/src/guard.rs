//! Scoped acquisition handle returned by the facade's entry points.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use keylock_core::Releaser;
use tokio::sync::OwnedSemaphorePermit;

use crate::engine::KeyedLock;

/// A held permit for a single key.
///
/// Dropping the guard releases the permit and, if this was the last interested
/// party for the key, retires the key's releaser from the index. Field
/// declaration order matters here: `_permit` is declared last so Rust's field
/// drop order (after the custom `Drop::drop` body runs) releases the permit
/// strictly *after* the index bookkeeping in `drop`, matching the ordering
/// rule that a release must become observable to waiters only once the index
/// and `is_not_in_use` updates are visible.
pub struct KeyedLockGuard<'a, K, S = RandomState>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    lock: &'a KeyedLock<K, S>,
    releaser: Arc<Releaser<K>>,
    _permit: OwnedSemaphorePermit,
}

impl<'a, K, S> KeyedLockGuard<'a, K, S>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        lock: &'a KeyedLock<K, S>,
        releaser: Arc<Releaser<K>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            lock,
            releaser,
            _permit: permit,
        }
    }
}

impl<K, S> Drop for KeyedLockGuard<'_, K, S>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.lock.release(&self.releaser);
    }
}
