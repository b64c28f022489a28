//! Acquisition entry points: the public surface of a [`KeyedLock`].

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::engine::KeyedLock;
use crate::error::{Error, Result};
use crate::guard::KeyedLockGuard;

impl<K, S> KeyedLock<K, S>
where
    K: Eq + Hash + Clone + Default + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Acquire `key`, waiting as long as necessary.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<'_, K, S> {
        let releaser = self.get_or_add(key);
        let semaphore = releaser.semaphore();
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("releaser semaphore is never closed");
        trace!("acquired permit");
        KeyedLockGuard::new(self, releaser, permit)
    }

    /// Acquire `key` if a permit is immediately available, without waiting.
    pub fn try_lock(&self, key: &K) -> Option<KeyedLockGuard<'_, K, S>> {
        let releaser = self.get_or_add(key);
        let semaphore = releaser.semaphore();
        match semaphore.try_acquire_owned() {
            Ok(permit) => Some(KeyedLockGuard::new(self, releaser, permit)),
            Err(_) => {
                self.release_without_permit(&releaser);
                None
            }
        }
    }

    /// Acquire `key`, giving up after `duration`. Returns `None` on timeout.
    pub async fn lock_for(&self, key: &K, duration: Duration) -> Option<KeyedLockGuard<'_, K, S>> {
        self.lock_until(key, Instant::now() + duration).await
    }

    /// Acquire `key`, giving up at `deadline`. Returns `None` on timeout.
    pub async fn lock_until(
        &self,
        key: &K,
        deadline: Instant,
    ) -> Option<KeyedLockGuard<'_, K, S>> {
        let releaser = self.get_or_add(key);
        let semaphore = releaser.semaphore();
        tokio::select! {
            permit = semaphore.acquire_owned() => {
                let permit = permit.expect("releaser semaphore is never closed");
                Some(KeyedLockGuard::new(self, releaser, permit))
            }
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                self.release_without_permit(&releaser);
                None
            }
        }
    }

    /// Acquire `key`, racing against cancellation of `token`.
    pub async fn lock_with_cancellation(
        &self,
        key: &K,
        token: CancellationToken,
    ) -> Result<KeyedLockGuard<'_, K, S>> {
        let releaser = self.get_or_add(key);
        let semaphore = releaser.semaphore();
        tokio::select! {
            permit = semaphore.acquire_owned() => {
                let permit = permit.expect("releaser semaphore is never closed");
                Ok(KeyedLockGuard::new(self, releaser, permit))
            }
            () = token.cancelled() => {
                self.release_without_permit(&releaser);
                Err(Error::Cancelled)
            }
        }
    }

    /// Acquire `key`, racing both a timeout and cancellation of `token`.
    pub async fn lock_for_with_cancellation(
        &self,
        key: &K,
        duration: Duration,
        token: CancellationToken,
    ) -> Result<Option<KeyedLockGuard<'_, K, S>>> {
        let releaser = self.get_or_add(key);
        let semaphore = releaser.semaphore();
        tokio::select! {
            permit = semaphore.acquire_owned() => {
                let permit = permit.expect("releaser semaphore is never closed");
                Ok(Some(KeyedLockGuard::new(self, releaser, permit)))
            }
            () = tokio::time::sleep(duration) => {
                self.release_without_permit(&releaser);
                Ok(None)
            }
            () = token.cancelled() => {
                self.release_without_permit(&releaser);
                Err(Error::Cancelled)
            }
        }
    }

    /// Acquire `key`, run `body` while holding it, and release on every exit
    /// path (including a panic unwinding through the guard).
    pub async fn with_lock<F, Fut, T>(&self, key: &K, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        body().await
    }

    /// Like [`KeyedLock::with_lock`] but only runs `body` if a permit is
    /// immediately available; returns `None` otherwise.
    pub async fn try_with_lock<F, Fut, T>(&self, key: &K, body: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.try_lock(key)?;
        Some(body().await)
    }

    /// Synchronous counterpart to [`KeyedLock::lock`] for non-async call sites.
    /// Panics if called from inside a Tokio runtime; blocks the current OS
    /// thread while waiting for a permit.
    pub fn lock_blocking(&self, key: &K) -> KeyedLockGuard<'_, K, S> {
        tokio::runtime::Handle::current().block_on(self.lock(key))
    }

    /// Synchronous counterpart to [`KeyedLock::try_lock`].
    pub fn try_lock_blocking(&self, key: &K) -> Option<KeyedLockGuard<'_, K, S>> {
        self.try_lock(key)
    }

    /// Synchronous counterpart to [`KeyedLock::lock_for`].
    pub fn lock_for_blocking(&self, key: &K, duration: Duration) -> Option<KeyedLockGuard<'_, K, S>> {
        tokio::runtime::Handle::current().block_on(self.lock_for(key, duration))
    }
}
