//! Validated construction of a [`KeyedLock`].

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use keylock_core::ConfigError;

use crate::engine::KeyedLock;

/// Builder for a [`KeyedLock`]. Construct via [`KeyedLock::builder`].
///
/// Defaults: `max_count = 1`, `pool_size = 0` (pooling disabled), `capacity = 0`
/// (let the index grow on demand).
pub struct KeyedLockBuilder<K, S = RandomState> {
    max_count: u32,
    pool_size: usize,
    pool_initial_fill: Option<usize>,
    capacity: usize,
    hasher: S,
    _key: PhantomData<fn() -> K>,
}

impl<K> KeyedLockBuilder<K, RandomState> {
    pub(crate) fn new() -> Self {
        Self {
            max_count: 1,
            pool_size: 0,
            pool_initial_fill: None,
            capacity: 0,
            hasher: RandomState::default(),
            _key: PhantomData,
        }
    }
}

impl<K, S> KeyedLockBuilder<K, S> {
    /// Per-key concurrency bound. Must be at least 1.
    pub fn max_count(mut self, max_count: u32) -> Self {
        self.max_count = max_count;
        self
    }

    /// Capacity of the releaser pool. `0` (the default) disables pooling.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Number of releasers to preallocate when pooling is enabled. Defaults to
    /// `pool_size` if not set. Must not exceed `pool_size`.
    pub fn pool_initial_fill(mut self, initial_fill: usize) -> Self {
        self.pool_initial_fill = Some(initial_fill);
        self
    }

    /// Initial capacity hint for the underlying concurrent index.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Use a custom key hasher instead of the default `RandomState`.
    pub fn hasher<S2: BuildHasher + Clone>(self, hasher: S2) -> KeyedLockBuilder<K, S2> {
        KeyedLockBuilder {
            max_count: self.max_count,
            pool_size: self.pool_size,
            pool_initial_fill: self.pool_initial_fill,
            capacity: self.capacity,
            hasher,
            _key: PhantomData,
        }
    }

    /// Validate configuration and construct the [`KeyedLock`].
    pub fn build(self) -> Result<KeyedLock<K, S>, ConfigError>
    where
        K: Eq + Hash + Clone + Default + Send + Sync + 'static,
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        if self.max_count < 1 {
            return Err(ConfigError::MaxCountOutOfRange(self.max_count));
        }

        let pool_initial_fill = self.pool_initial_fill.unwrap_or(self.pool_size);
        if pool_initial_fill > self.pool_size {
            return Err(ConfigError::PoolInitialFillExceedsPoolSize {
                initial_fill: pool_initial_fill,
                pool_size: self.pool_size,
            });
        }

        Ok(KeyedLock::from_parts(
            self.max_count,
            self.pool_size,
            pool_initial_fill,
            self.capacity,
            self.hasher,
        ))
    }
}

impl<K> Default for KeyedLockBuilder<K, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let lock = KeyedLockBuilder::<String>::new().build().unwrap();
        assert_eq!(lock.max_count(), 1);
    }

    #[test]
    fn rejects_zero_max_count() {
        let err = KeyedLockBuilder::<String>::new()
            .max_count(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MaxCountOutOfRange(0));
    }

    #[test]
    fn rejects_initial_fill_exceeding_pool_size() {
        let err = KeyedLockBuilder::<String>::new()
            .pool_size(2)
            .pool_initial_fill(3)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::PoolInitialFillExceedsPoolSize {
                initial_fill: 3,
                pool_size: 2,
            }
        );
    }

    #[test]
    fn pool_initial_fill_defaults_to_pool_size() {
        let lock = KeyedLockBuilder::<String>::new()
            .pool_size(5)
            .build()
            .unwrap();
        assert_eq!(lock.pool_len(), Some(5));
    }
}
