//! Bounded free list of recyclable [`Releaser`]s.
//!
//! Amortizes releaser (and semaphore) allocation under hot-key churn. Mirrors the
//! small `parking_lot::Mutex`-guarded structure the engine uses for its own
//! bookkeeping rather than a lock-free free list: contention here is brief and
//! never suspends, so a fine-grained lock-free structure would add complexity
//! without a measurable payoff.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::Releaser;

/// A bounded pool of reusable [`Releaser`]s.
pub struct Pool<K> {
    free: Mutex<VecDeque<Arc<Releaser<K>>>>,
    capacity: usize,
}

impl<K> Pool<K>
where
    K: Clone,
{
    /// Build a pool with capacity `capacity`, preallocating `initial_fill` releasers
    /// via `seed_key` (rewritten by the first `take` of each, so its value is
    /// irrelevant beyond satisfying the type).
    pub fn new(capacity: usize, initial_fill: usize, max_count: u32, seed_key: &K) -> Self {
        let mut free = VecDeque::with_capacity(capacity);
        for _ in 0..initial_fill {
            let releaser = Arc::new(Releaser::new(seed_key.clone(), max_count));
            releaser.mark_unused();
            free.push_back(releaser);
        }
        Self {
            free: Mutex::new(free),
            capacity,
        }
    }

    /// Current number of idle releasers held by the pool. Advisory.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Returns `true` if the pool currently holds no idle releasers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take a releaser for `key`, reusing an idle one if available or constructing
    /// a fresh one via the factory otherwise.
    pub fn take(&self, key: K, max_count: u32) -> Arc<Releaser<K>> {
        if let Some(releaser) = self.free.lock().pop_front() {
            trace!("reusing idle releaser from pool");
            releaser.reset(key, max_count);
            releaser
        } else {
            debug!("pool empty, constructing fresh releaser");
            Arc::new(Releaser::new(key, max_count))
        }
    }

    /// Return a retired releaser to the pool.
    ///
    /// Dropped on the floor if the pool is already at capacity. Precondition:
    /// `releaser` must already be marked `is_not_in_use` and have no in-flight
    /// acquisition about to wait on its semaphore.
    pub fn put(&self, releaser: Arc<Releaser<K>>) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push_back(releaser);
            trace!("returned releaser to pool");
        } else {
            warn!("pool at capacity, discarding retired releaser");
        }
    }

    /// Drop every idle releaser currently held by the pool.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}
