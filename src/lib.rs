//! # Tessel
//!
//! In-process software transactional memory.
//!
//! Tessel lets many threads or async tasks mutate shared state atomically
//! without holding a lock across program logic. State lives in transactional
//! cells; transactions are descriptions built from combinators and run by a
//! manager that validates optimistically and retries on conflict.
//!
//! ## Quick Start
//!
//! ```
//! use tessel::prelude::*;
//!
//! let from = TRef::new(100);
//! let to = TRef::new(0);
//!
//! let transfer = {
//!     let (from, to) = (from.clone(), to.clone());
//!     from.get().and_then(move |balance| {
//!         Stm::check(balance >= 30)
//!             .then(from.update(|b| b - 30))
//!             .then(to.update(|b| b + 30))
//!     })
//! };
//!
//! commit(&transfer).unwrap();
//! assert_eq!(commit(&from.get().zip(to.get())).unwrap(), (70, 30));
//! ```
//!
//! ## Blocking
//!
//! A transaction that calls [`Stm::retry`] (directly or through a full
//! queue, an empty queue or a missing permit) is parked until one of the
//! cells it read changes. [`commit`] parks the thread, [`commit_async`]
//! awaits, and [`TransactionManager::commit_interruptible`] can be
//! cancelled with an [`Interrupt`].
//!
//! ## Building Blocks
//!
//! - [`TRef`] - a single transactional cell
//! - [`TArray`] - fixed-length array of cells
//! - [`TQueue`] - FIFO queue with back-pressure, dropping or sliding overflow
//! - [`TSemaphore`] - counting semaphore

#![warn(missing_docs)]

mod error;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use tessel_concurrency::{
    commit, commit_async, Attempt, Interrupt, Journal, Registration, Stm, StmStats, TRef, Todo,
    TransactionManager, TxResult, TxSignal, Wakeup,
};

// Re-export structures
pub use tessel_primitives::{
    ArrayError, OverflowStrategy, QueueError, SemaphorePermit, TArray, TQueue, TSemaphore,
};

// Re-export core types
pub use tessel_core::{CommitError, ConfigError, RefId, StmConfig, TxnId, Versioned};
