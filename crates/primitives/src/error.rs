//! Typed failures of the transactional structures

use thiserror::Error;

/// TArray failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// Index past the end of the array
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },
}

/// TQueue failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been shut down
    #[error("queue is shut down")]
    Shutdown,

    /// A back-pressured batch can never fit
    #[error("batch of {batch} elements exceeds queue capacity {capacity}")]
    BatchTooLarge {
        /// Elements offered at once
        batch: usize,
        /// Queue capacity
        capacity: usize,
    },
}

impl QueueError {
    /// Check if this is a shutdown error
    pub fn is_shutdown(&self) -> bool {
        matches!(self, QueueError::Shutdown)
    }
}
