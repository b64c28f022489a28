//! Releaser and pool primitives backing the `keylock` keyed-semaphore engine.
//!
//! This crate holds the pieces of the engine that do not need to know about the
//! concurrent index: the per-key [`Releaser`] record and the [`Pool`] that recycles
//! them. The race-free `GetOrAdd`/`Release` orchestration that ties these to a
//! concurrent map lives in the `keylock` crate.

/// Configuration validation errors.
pub mod error;
/// Bounded free list of recyclable releasers.
mod pool;
/// Per-live-key releaser record.
mod releaser;

pub use error::{ConfigError, ConfigResult};
pub use pool::Pool;
pub use releaser::{ReleaseOutcome, Releaser};
