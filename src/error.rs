//! # Errors
//!
//! A failed [validate](crate::StampedLock::validate) isn't here on purpose: it's an expected answer
//! of the optimistic path, not a failure.

use std::time::Duration;

use thiserror::Error;

use crate::lock::Mode;

/// Errors returned by the lock itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// A blocking acquisition got cancelled through its [Interrupt](crate::Interrupt) before the grant.
    /// The lock is left as if the request was never made.
    #[error("interrupted while waiting for the lock")]
    Interrupted,

    /// A bounded acquisition ran out of time. Same cleanup as [LockError::Interrupted].
    #[error("timed out after {0:?} waiting for the lock")]
    Timeout(Duration),

    /// An unlock got a stamp that doesn't match a currently held lock of the expected mode.
    /// It's a bug in the caller's lock discipline, the lock state is untouched.
    #[error("stamp does not match a held {expected} lock")]
    IllegalState {
        /// The mode the unlock call was releasing.
        expected: Mode,
    },
}

/// Errors of the starvation check driver.
#[derive(Error, Debug)]
pub enum DemoError {
    /// The writer waited longer than the configured threshold.
    #[error("writer starvation occurred: waited {waited:?}, threshold {threshold:?}")]
    Starvation {
        waited: Duration,
        threshold: Duration,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
}
