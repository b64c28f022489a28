//! A keyed asynchronous lock: independent bounded semaphores multiplexed over a
//! family of keys.
//!
//! Acquiring the lock for a key admits up to a configured `max_count` concurrent
//! holders of *that* key while remaining fully independent of acquisitions on any
//! other key. This serializes critical sections on logical entities — account
//! IDs, file paths, tenant IDs — without serializing unrelated work.
//!
//! ```no_run
//! # async fn run() {
//! use keylock::KeyedLock;
//!
//! let lock: KeyedLock<String> = KeyedLock::builder().max_count(1).build().unwrap();
//! let guard = lock.lock(&"account-42".to_string()).await;
//! // critical section for "account-42"
//! drop(guard);
//! # }
//! ```
//!
//! Reentrancy is not supported: a task that re-enters the same key consumes an
//! additional permit and will deadlock if `max_count` is exhausted. Fairness
//! across distinct keys is not guaranteed; within a key it is inherited from
//! [`tokio::sync::Semaphore`].

mod builder;
mod engine;
/// Error taxonomy for construction and acquisition failures.
pub mod error;
mod facade;
mod guard;

pub use builder::KeyedLockBuilder;
pub use engine::KeyedLock;
pub use error::{ConfigError, Error, Result};
pub use guard::KeyedLockGuard;

pub use tokio_util::sync::CancellationToken;
