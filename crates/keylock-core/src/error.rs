//! Error taxonomy for the keyed-semaphore engine.

/// Failures raised while validating a [`crate::Pool`]/[`crate::Releaser`] configuration.
///
/// These surface immediately from the builder (`keylock::KeyedLockBuilder::build`) before
/// any engine state is created.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_count must be at least 1, got {0}")]
    MaxCountOutOfRange(u32),

    #[error(
        "pool_initial_fill ({initial_fill}) must not exceed pool_size ({pool_size})"
    )]
    PoolInitialFillExceedsPoolSize { initial_fill: usize, pool_size: usize },
}

/// Crate-wide result alias for configuration validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
