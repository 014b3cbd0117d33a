//! Transactional data structures for tessel
//!
//! Every structure here is built from [`TRef`](tessel_concurrency::TRef)
//! cells, so its operations are ordinary [`Stm`](tessel_concurrency::Stm)
//! values that compose with any other transaction:
//!
//! - [`TArray`]: fixed-length array of independently versioned cells
//! - [`TQueue`]: bounded or unbounded FIFO queue with back-pressure,
//!   dropping or sliding overflow
//! - [`TSemaphore`]: counting semaphore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod tarray;
pub mod tqueue;
pub mod tsemaphore;

pub use error::{ArrayError, QueueError};
pub use tarray::TArray;
pub use tqueue::{OverflowStrategy, TQueue};
pub use tsemaphore::{SemaphorePermit, TSemaphore};
