//! The per-live-key releaser record: a bounded semaphore plus the reference-counting
//! and recycling bookkeeping described in the engine's `GetOrAdd`/`Release` protocol.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Mutable state guarded by a releaser's own monitor.
///
/// Everything `GetOrAdd`/`Release` need to reason about atomically — the key this
/// releaser currently represents, how many parties are interested in it, whether it
/// has already been marked for recycling, and the semaphore handle itself — lives
/// behind a single `parking_lot::Mutex` so the whole decision is one short, never
/// suspending critical section.
struct State<K> {
    key: K,
    ref_count: u32,
    is_not_in_use: bool,
    semaphore: Arc<Semaphore>,
}

/// A bounded semaphore bound to a single live key, reference-counted by interested
/// parties (holders, waiters, and the installer during its own installation window).
pub struct Releaser<K> {
    state: Mutex<State<K>>,
}

/// Result of [`Releaser::release`]: whether the releaser still has interested
/// parties, or whether this was the last one and it is retiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// `ref_count` was decremented; the releaser remains installed.
    StillActive,
    /// `ref_count` reached zero; the releaser has been marked `is_not_in_use` and the
    /// caller's `on_retire` callback ran while the monitor was still held.
    Retired,
}

impl<K> Releaser<K> {
    /// Construct a freshly installed releaser for `key` with `ref_count = 1`.
    pub fn new(key: K, max_count: u32) -> Self {
        Self {
            state: Mutex::new(State {
                key,
                ref_count: 1,
                is_not_in_use: false,
                semaphore: Arc::new(Semaphore::new(max_count as usize)),
            }),
        }
    }

    /// Rewrite this releaser for a new life under `key`, as performed by
    /// [`crate::Pool::take`]. A brand new semaphore is installed rather than
    /// attempting to restore permit counts on the old one, sidestepping the race
    /// between the final in-flight permit release and a new acquirer reusing the
    /// same instance.
    pub(crate) fn reset(&self, key: K, max_count: u32) {
        let mut state = self.state.lock();
        state.key = key;
        state.ref_count = 1;
        state.is_not_in_use = false;
        state.semaphore = Arc::new(Semaphore::new(max_count as usize));
        debug!("recycled releaser for new key, semaphore reset to full capacity");
    }

    /// Mark this releaser as not-in-use without touching `ref_count`.
    ///
    /// Used when an installer constructed a releaser speculatively and lost the
    /// race to publish it; the instance still carries `ref_count = 1` from
    /// construction but must be flagged before returning to the pool.
    pub fn mark_unused(&self) {
        self.state.lock().is_not_in_use = true;
        trace!("releaser marked not-in-use");
    }

    /// Clone the current semaphore handle.
    ///
    /// Callers must only do this after a successful [`Releaser::try_increment`] or
    /// immediately after construction/installation, while they are guaranteed to be
    /// one of the releaser's interested parties (so it cannot retire out from under
    /// them between increment and this call).
    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.state.lock().semaphore.clone()
    }

    /// Attempt to adopt this releaser for `key`.
    ///
    /// Succeeds only if the releaser is not already marked for recycling **and**
    /// still represents `key` — the second check is the defense against the
    /// ABA hazard where this instance was observed in the index, retired, and
    /// recycled for a different key before the caller got here.
    pub fn try_increment(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        let mut state = self.state.lock();
        if !state.is_not_in_use && state.key == *key {
            state.ref_count += 1;
            trace!(ref_count = state.ref_count, "try_increment succeeded");
            true
        } else {
            debug!("try_increment failed: releaser retired or recycled for a different key");
            false
        }
    }

    /// Release one interested party's claim.
    ///
    /// If this was the last claim, `on_retire` runs with the key *while the
    /// monitor is still held*, so it can remove the index entry before any racing
    /// `try_increment` can observe a mapping that no longer corresponds to a live
    /// releaser. `is_not_in_use` is set before `on_retire` runs for the same reason.
    pub fn release<F>(&self, on_retire: F) -> ReleaseOutcome
    where
        F: FnOnce(&K),
    {
        let mut state = self.state.lock();
        if state.ref_count == 1 {
            state.is_not_in_use = true;
            on_retire(&state.key);
            trace!("releaser retired, last interested party released");
            ReleaseOutcome::Retired
        } else {
            state.ref_count -= 1;
            trace!(ref_count = state.ref_count, "release decremented ref_count");
            ReleaseOutcome::StillActive
        }
    }

    /// Advisory snapshot of `ref_count`, or `0` if the releaser has already retired.
    pub fn remaining_count(&self) -> u32 {
        let state = self.state.lock();
        if state.is_not_in_use {
            0
        } else {
            state.ref_count
        }
    }

    /// Advisory check of whether this releaser is still a live mapping for `key`.
    pub fn is_in_use(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        let state = self.state.lock();
        !state.is_not_in_use && state.key == *key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_releaser_has_ref_count_one_and_full_capacity() {
        let r = Releaser::new("a", 3);
        assert_eq!(r.remaining_count(), 1);
        assert!(r.is_in_use(&"a"));
        assert_eq!(r.semaphore().available_permits(), 3);
    }

    #[test]
    fn try_increment_succeeds_for_matching_key() {
        let r = Releaser::new("a", 1);
        assert!(r.try_increment(&"a"));
        assert_eq!(r.remaining_count(), 2);
    }

    #[test]
    fn try_increment_fails_for_mismatched_key() {
        let r = Releaser::new("a", 1);
        assert!(!r.try_increment(&"b"));
        assert_eq!(r.remaining_count(), 1);
    }

    #[test]
    fn try_increment_fails_once_retired() {
        let r = Releaser::new("a", 1);
        let outcome = r.release(|_| {});
        assert_eq!(outcome, ReleaseOutcome::Retired);
        assert!(!r.try_increment(&"a"));
    }

    #[test]
    fn release_decrements_until_last_party_retires() {
        let r = Releaser::new("a", 1);
        assert!(r.try_increment(&"a"));
        assert_eq!(r.remaining_count(), 2);

        assert_eq!(r.release(|_| panic!("must not retire yet")), ReleaseOutcome::StillActive);
        assert_eq!(r.remaining_count(), 1);

        let mut retired_key = None;
        assert_eq!(
            r.release(|k| retired_key = Some(*k)),
            ReleaseOutcome::Retired
        );
        assert_eq!(retired_key, Some("a"));
        assert_eq!(r.remaining_count(), 0);
    }

    #[test]
    fn reset_rewrites_key_and_restores_full_capacity() {
        let r = Releaser::new("a", 2);
        let _ = r.try_increment(&"a");
        r.release(|_| {});
        r.release(|_| {});

        r.reset("b", 5);
        assert!(r.is_in_use(&"b"));
        assert!(!r.is_in_use(&"a"));
        assert_eq!(r.remaining_count(), 1);
        assert_eq!(r.semaphore().available_permits(), 5);
    }

    #[test]
    fn mark_unused_flags_without_touching_ref_count() {
        let r = Releaser::new("a", 1);
        r.mark_unused();
        assert_eq!(r.remaining_count(), 0);
        assert!(!r.try_increment(&"a"));
    }

    #[test]
    fn aba_hazard_key_recheck_after_recycle() {
        // Simulates the scenario in spec §8 scenario 6: a reader holds a stale
        // `Arc<Releaser<_>>` across a recycle-for-a-different-key race.
        let r = Arc::new(Releaser::new("a", 1));
        let stale = Arc::clone(&r);

        assert_eq!(r.release(|_| {}), ReleaseOutcome::Retired);
        r.reset("b", 1);

        // The stale reader's key check must fail even though the instance is alive.
        assert!(!stale.try_increment(&"a"));
        // But the recycled instance works fine for its new key.
        assert!(r.try_increment(&"b"));
    }
}
