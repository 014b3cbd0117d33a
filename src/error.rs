//! Unified error type for applications mixing several structures.
//!
//! Each structure fails with its own error enum. Transactions that combine
//! them can use [`Error`] as their error type: it converts from every
//! structure error, so `map_err(Error::from)` (or an `update_stm` bound on
//! `From<ArrayError>`) lines the branches up.

use thiserror::Error;
use tessel_core::CommitError;
use tessel_primitives::{ArrayError, QueueError};

/// All Tessel transaction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Array access failed
    #[error(transparent)]
    Array(#[from] ArrayError),

    /// Queue operation failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A blocked transaction was interrupted
    #[error("transaction interrupted")]
    Interrupted,
}

/// Result type for Tessel operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error came from a shut-down queue.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Queue(QueueError::Shutdown))
    }

    /// Check if this is an interruption.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

impl<E: Into<Error>> From<CommitError<E>> for Error {
    fn from(error: CommitError<E>) -> Self {
        match error {
            CommitError::Failed(e) => e.into(),
            CommitError::Interrupted => Error::Interrupted,
        }
    }
}
