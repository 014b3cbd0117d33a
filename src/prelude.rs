//! Convenient imports for Tessel.
//!
//! ```
//! use tessel::prelude::*;
//!
//! let queue = TQueue::unbounded();
//! commit(&queue.offer("job")).unwrap();
//! assert_eq!(commit(&queue.take()).unwrap(), "job");
//! ```

// Running transactions
pub use crate::{commit, commit_async, Interrupt, TransactionManager};

// Describing transactions
pub use crate::{Stm, TxResult, TxSignal};

// Structures
pub use crate::{TArray, TQueue, TRef, TSemaphore};

// Error handling
pub use crate::{ArrayError, CommitError, Error, QueueError};
