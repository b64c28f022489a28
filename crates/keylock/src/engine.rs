//! The concurrent index and the race-free `GetOrAdd`/`Release` protocol tying it
//! to the [`Releaser`]/[`Pool`] primitives.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keylock_core::{Pool, Releaser};
use tracing::{debug, trace, warn};

use crate::builder::KeyedLockBuilder;

/// A keyed asynchronous lock: independent bounded semaphores multiplexed over a
/// family of keys, one admitted at most `max_count` at a time.
///
/// Construct via [`KeyedLock::builder`]. Acquisition entry points live on
/// [`crate::facade`] (re-exported as inherent methods).
pub struct KeyedLock<K, S = RandomState> {
    pub(crate) index: DashMap<K, Arc<Releaser<K>>, S>,
    pub(crate) pool: Option<Pool<K>>,
    pub(crate) max_count: u32,
}

impl<K> KeyedLock<K, RandomState>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
{
    /// Start building a [`KeyedLock`] with default configuration (`max_count = 1`,
    /// pooling disabled).
    pub fn builder() -> KeyedLockBuilder<K, RandomState> {
        KeyedLockBuilder::new()
    }

    /// Construct a [`KeyedLock`] with `max_count = 1` and no pooling.
    pub fn new() -> Self {
        Self::builder().build().expect("default configuration is always valid")
    }
}

impl<K> Default for KeyedLock<K, RandomState>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> KeyedLock<K, S>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        max_count: u32,
        pool_size: usize,
        pool_initial_fill: usize,
        capacity: usize,
        hasher: S,
    ) -> Self {
        let pool = if pool_size > 0 {
            Some(Pool::new(
                pool_size,
                pool_initial_fill,
                max_count,
                &K::default(),
            ))
        } else {
            None
        };
        Self {
            index: DashMap::with_capacity_and_hasher(capacity, hasher),
            pool,
            max_count,
        }
    }

    /// The configured per-key concurrency bound.
    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Number of idle releasers currently held by the pool, or `None` if pooling
    /// is disabled.
    pub fn pool_len(&self) -> Option<usize> {
        self.pool.as_ref().map(Pool::len)
    }

    /// Advisory size of the concurrent index.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Whether `key` currently has a live, non-retiring mapping in the index.
    pub fn is_in_use(&self, key: &K) -> bool {
        self.index
            .get(key)
            .map(|entry| entry.value().is_in_use(key))
            .unwrap_or(false)
    }

    /// Number of parties (holders + waiters) currently interested in `key`, or
    /// `0` if `key` has no live mapping. Advisory; racy by construction.
    pub fn remaining_count(&self, key: &K) -> u32 {
        self.index
            .get(key)
            .map(|entry| entry.value().remaining_count())
            .unwrap_or(0)
    }

    /// `max_count - remaining_count(key)`, clamped at zero. Advisory.
    pub fn current_count(&self, key: &K) -> u32 {
        self.max_count.saturating_sub(self.remaining_count(key))
    }

    /// Obtain the live releaser for `key`, installing one if absent.
    ///
    /// Loops only when it observes a releaser mid-retirement (its last holder is
    /// concurrently tearing it down) or loses an installation race; both are
    /// transient and resolve within a bounded number of retries.
    pub(crate) fn get_or_add(&self, key: &K) -> Arc<Releaser<K>> {
        loop {
            if let Some(entry) = self.index.get(key) {
                let releaser = Arc::clone(entry.value());
                drop(entry);

                // Test-only perturbation: widen the window between the lookup
                // above and the increment below so integration tests can land
                // a concurrent pool recycle inside it and exercise the key
                // re-check in `Releaser::try_increment`. Gated behind a
                // feature (rather than `cfg(test)`) because integration tests
                // in `tests/` build against the library as an external
                // dependency, where `cfg(test)` of the library crate itself
                // is never active; the `test-perturbation` feature is wired
                // on for all test builds via a self dev-dependency.
                #[cfg(feature = "test-perturbation")]
                std::thread::yield_now();

                if releaser.try_increment(key) {
                    return releaser;
                }
                trace!("releaser retiring concurrently, retrying get_or_add");
                continue;
            }

            let candidate = match &self.pool {
                Some(pool) => pool.take(key.clone(), self.max_count),
                None => Arc::new(Releaser::new(key.clone(), self.max_count)),
            };

            match self.index.entry(key.clone()) {
                Entry::Vacant(vacant) => {
                    debug!("installing new releaser for key");
                    vacant.insert(Arc::clone(&candidate));
                    return candidate;
                }
                Entry::Occupied(occupied) => {
                    let existing = Arc::clone(occupied.get());
                    drop(occupied);
                    if existing.try_increment(key) {
                        self.discard_unused(candidate);
                        return existing;
                    }
                    // Lost the race to an installer whose releaser is itself
                    // retiring; give the speculative candidate back and retry.
                    self.discard_unused(candidate);
                }
            }
        }
    }

    fn discard_unused(&self, candidate: Arc<Releaser<K>>) {
        candidate.mark_unused();
        if let Some(pool) = &self.pool {
            pool.put(candidate);
        }
    }

    /// Release one interested party's claim on its releaser, returning a
    /// permit to its semaphore.
    ///
    /// Used by [`crate::guard::KeyedLockGuard::drop`]; the permit itself is
    /// released by the guard after this call returns, not by this method.
    pub(crate) fn release(&self, releaser: &Arc<Releaser<K>>) {
        self.release_accounting(releaser);
    }

    /// Release one interested party's claim without a corresponding permit —
    /// used on timeout/cancellation paths where no permit was ever taken.
    pub(crate) fn release_without_permit(&self, releaser: &Arc<Releaser<K>>) {
        self.release_accounting(releaser);
    }

    fn release_accounting(&self, releaser: &Arc<Releaser<K>>) {
        use keylock_core::ReleaseOutcome;

        let outcome = releaser.release(|retiring_key| {
            self.index
                .remove_if(retiring_key, |_, v| Arc::ptr_eq(v, releaser));
        });

        if outcome == ReleaseOutcome::Retired {
            trace!("releaser retired, returning to pool if enabled");
            if let Some(pool) = &self.pool {
                pool.put(Arc::clone(releaser));
            }
        }
    }

    /// Best-effort shutdown: drops every live mapping and empties the pool.
    /// In-flight waiters on a dropped releaser's semaphore are not forcibly
    /// woken — see the crate's module docs.
    pub fn shutdown(&self) {
        self.index.clear();
        if let Some(pool) = &self.pool {
            pool.clear();
        }
        warn!("keyed lock shutdown: index and pool cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_add_installs_then_reuses() {
        let lock: KeyedLock<String> = KeyedLock::builder().max_count(2).build().unwrap();
        let key = "a".to_string();

        let r1 = lock.get_or_add(&key);
        assert_eq!(lock.index_len(), 1);
        assert_eq!(lock.remaining_count(&key), 1);

        let r2 = lock.get_or_add(&key);
        assert!(Arc::ptr_eq(&r1, &r2));
        assert_eq!(lock.remaining_count(&key), 2);
    }

    #[test]
    fn release_removes_last_holder_from_index() {
        let lock: KeyedLock<String> = KeyedLock::builder().max_count(1).build().unwrap();
        let key = "a".to_string();

        let r = lock.get_or_add(&key);
        assert!(lock.is_in_use(&key));
        lock.release(&r);
        assert!(!lock.is_in_use(&key));
        assert_eq!(lock.index_len(), 0);
        assert_eq!(lock.remaining_count(&key), 0);
    }

    #[test]
    fn different_keys_get_independent_releasers() {
        let lock: KeyedLock<String> = KeyedLock::builder().max_count(1).build().unwrap();
        let a = lock.get_or_add(&"a".to_string());
        let b = lock.get_or_add(&"b".to_string());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(lock.index_len(), 2);
    }

    #[test]
    fn retiring_releaser_returns_to_pool_and_is_reused_on_next_add() {
        let lock: KeyedLock<String> = KeyedLock::builder()
            .max_count(1)
            .pool_size(4)
            .pool_initial_fill(0)
            .build()
            .unwrap();
        let key = "a".to_string();

        let r = lock.get_or_add(&key);
        lock.release(&r);
        assert_eq!(lock.pool_len(), Some(1));

        let r2 = lock.get_or_add(&"b".to_string());
        assert_eq!(lock.pool_len(), Some(0));
        assert!(Arc::ptr_eq(&r, &r2));
    }

    #[test]
    fn release_without_permit_runs_same_bookkeeping() {
        let lock: KeyedLock<String> = KeyedLock::builder().max_count(1).build().unwrap();
        let key = "a".to_string();
        let r = lock.get_or_add(&key);
        lock.release_without_permit(&r);
        assert!(!lock.is_in_use(&key));
    }

    #[test]
    fn current_count_reflects_outstanding_holders() {
        let lock: KeyedLock<String> = KeyedLock::builder().max_count(3).build().unwrap();
        let key = "a".to_string();
        let r1 = lock.get_or_add(&key);
        let _r2 = lock.get_or_add(&key);
        assert_eq!(lock.current_count(&key), 1);
        lock.release(&r1);
        assert_eq!(lock.current_count(&key), 2);
    }
}
