//! Core identifier types for the STM engine
//!
//! This module defines the two identifiers used throughout the system:
//! - [`TxnId`]: Unique identifier for one evaluation attempt of a transaction
//! - [`RefId`]: Stable handle of a transactional cell
//!
//! Both are allocated from process-wide monotonic counters, so identifiers
//! handed out by different managers or threads never collide.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one evaluation attempt
///
/// A new TxnId is allocated every time a transaction is (re-)evaluated.
/// It is only used as the key under which a blocked attempt registers its
/// wakeup callbacks, so that the attempt can later remove exactly its own
/// registrations.
///
/// # Examples
///
/// ```
/// use tessel_core::types::TxnId;
///
/// let a = TxnId::next();
/// let b = TxnId::next();
/// assert!(b > a);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(u64);

impl TxnId {
    /// Allocate the next attempt identifier
    pub fn next() -> Self {
        TxnId(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Stable handle of a transactional cell
///
/// Every `TRef` receives a RefId when it is allocated. Journals are keyed by
/// RefId rather than by object identity, and commit locks are striped by it.
///
/// # Examples
///
/// ```
/// use tessel_core::types::RefId;
///
/// let a = RefId::next();
/// let b = RefId::next();
/// assert_ne!(a, b);
/// assert_eq!(a.stripe(1), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefId(u64);

impl RefId {
    /// Allocate the next cell handle
    pub fn next() -> Self {
        RefId(NEXT_REF_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Index of the lock stripe guarding this cell in a table of `stripes`
    #[inline]
    pub fn stripe(&self, stripes: usize) -> usize {
        debug_assert!(stripes > 0);
        (self.0 % stripes as u64) as usize
    }
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}
