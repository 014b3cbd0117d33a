//! Striped commit locks
//!
//! The commit critical section is a process-wide table of mutex stripes
//! indexed by [`RefId`]. A transaction locks the distinct stripes of every
//! ref in its journal in ascending stripe order, so two commits can never
//! wait on each other in a cycle, and commits on disjoint stripes proceed in
//! parallel.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tessel_core::RefId;

/// Number of stripes in the process-wide table
pub const COMMIT_STRIPES: usize = 256;

pub(crate) static COMMIT_LOCKS: Lazy<StripedLocks> =
    Lazy::new(|| StripedLocks::new(COMMIT_STRIPES));

pub(crate) struct StripedLocks {
    stripes: Box<[Mutex<()>]>,
}

/// Holds a set of stripes; released on drop
pub(crate) struct StripeGuard<'a> {
    _guards: SmallVec<[MutexGuard<'a, ()>; 8]>,
}

impl StripedLocks {
    pub(crate) fn new(stripes: usize) -> Self {
        assert!(stripes > 0, "lock table needs at least one stripe");
        StripedLocks {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Sorted, deduplicated stripe indices covering `ids`
    pub(crate) fn stripes_for<I>(&self, ids: I) -> SmallVec<[usize; 8]>
    where
        I: IntoIterator<Item = RefId>,
    {
        let mut stripes: SmallVec<[usize; 8]> = ids
            .into_iter()
            .map(|id| id.stripe(self.stripes.len()))
            .collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes
    }

    /// Lock every stripe covering `ids`
    pub(crate) fn lock<I>(&self, ids: I) -> StripeGuard<'_>
    where
        I: IntoIterator<Item = RefId>,
    {
        let guards = self
            .stripes_for(ids)
            .into_iter()
            .map(|stripe| self.stripes[stripe].lock())
            .collect();
        StripeGuard { _guards: guards }
    }
}
