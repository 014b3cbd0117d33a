//! Core types for the tessel STM engine
//!
//! This crate defines the pure data the engine is built from:
//! - [`TxnId`] / [`RefId`]: attempt and cell identifiers
//! - [`Versioned`]: a committed value with its commit counter
//! - [`StmConfig`]: transaction manager tunables
//! - [`CommitError`] / [`ConfigError`]: caller-visible errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;
pub mod versioned;

pub use config::StmConfig;
pub use error::{CommitError, ConfigError};
pub use types::{RefId, TxnId};
pub use versioned::Versioned;
