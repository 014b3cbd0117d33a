//! Concurrency layer for tessel
//!
//! This crate implements software transactional memory with:
//! - TRef: transactional cells with a wakeup registry
//! - Journal: per-attempt read/write tracking with first-touch snapshots
//! - Stm: composable transaction descriptions, evaluated by a trampoline
//! - TransactionManager: optimistic commit, conflict restart, retry blocking
//! - Host runtimes for threads and tokio tasks

#![warn(missing_docs)]
#![warn(clippy::all)]

mod evaluator;
pub mod journal;
pub mod locks;
pub mod manager;
pub mod runtime;
pub mod stm;
pub mod tref;

pub use journal::Journal;
pub use manager::{Attempt, Registration, StmStats, TransactionManager};
pub use runtime::{commit, commit_async, Interrupt};
pub use stm::{Stm, TxResult, TxSignal};
pub use tref::{TRef, Todo, Wakeup};

// Re-export the core types callers need alongside the engine
pub use tessel_core::{CommitError, RefId, StmConfig, TxnId, Versioned};
