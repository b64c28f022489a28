//! Runtime error taxonomy for acquisition paths.

pub use keylock_core::ConfigError;

/// Errors surfaced from an acquisition attempt.
///
/// Timeouts are not represented here — the timed entry points report them as
/// `None` rather than an error variant.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Rejected at construction; see [`ConfigError`] for the specific violation.
    #[error("invalid keyed lock configuration: {0}")]
    Config(#[from] ConfigError),

    /// The acquisition's `CancellationToken` fired before a permit was granted.
    #[error("acquisition cancelled before a permit was granted")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display() {
        assert_eq!(
            Error::Cancelled.to_string(),
            "acquisition cancelled before a permit was granted"
        );
    }

    #[test]
    fn config_error_wraps_and_displays() {
        let err = Error::from(ConfigError::MaxCountOutOfRange(0));
        assert!(err.to_string().contains("max_count must be at least 1"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
