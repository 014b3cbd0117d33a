//! Error types shared by the STM crates
//!
//! Conflicts and explicit retries never appear here: both are handled inside
//! the engine and are not observable by callers. What callers can see is the
//! transaction's own typed failure or an interruption.

use thiserror::Error;

/// Outcome of an interruptible commit that did not produce a value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError<E> {
    /// The transaction failed with its declared error; nothing was committed
    #[error("transaction failed")]
    Failed(E),

    /// The caller was interrupted while the transaction was blocked
    #[error("transaction interrupted")]
    Interrupted,
}

impl<E> CommitError<E> {
    /// Check if this is an interruption
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CommitError::Interrupted)
    }

    /// The transaction's own error, if any
    pub fn into_failure(self) -> Option<E> {
        match self {
            CommitError::Failed(e) => Some(e),
            CommitError::Interrupted => None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The text is not valid TOML or does not match the schema
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}
