//! Transactional semaphore
//!
//! A permit counter in a single [`TRef`]. Acquiring more permits than are
//! available retries, so the acquiring transaction blocks until a release
//! commits.

use std::fmt;
use tessel_concurrency::{commit, Stm, TRef};
use tracing::trace;

/// Counting semaphore usable inside transactions
///
/// Cloning shares the permits.
#[derive(Clone)]
pub struct TSemaphore {
    permits: TRef<usize>,
}

impl fmt::Debug for TSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TSemaphore").field(&self.permits.id()).finish()
    }
}

impl TSemaphore {
    /// Semaphore holding `permits` permits
    pub fn new(permits: usize) -> Self {
        TSemaphore {
            permits: TRef::new(permits),
        }
    }

    /// Create a semaphore inside the current transaction
    pub fn make(permits: usize) -> Stm<TSemaphore> {
        TRef::make(permits).map(|permits| TSemaphore { permits })
    }

    /// Permits currently available
    pub fn available(&self) -> Stm<usize> {
        self.permits.get()
    }

    /// Take one permit, retrying until one is available
    pub fn acquire(&self) -> Stm<()> {
        self.acquire_n(1)
    }

    /// Take `n` permits at once, retrying until all are available
    pub fn acquire_n(&self, n: usize) -> Stm<()> {
        let permits = self.permits.clone();
        self.permits.get().and_then(move |available| {
            if available >= n {
                permits.set(available - n)
            } else {
                Stm::retry()
            }
        })
    }

    /// Take one permit if available
    pub fn try_acquire(&self) -> Stm<bool> {
        self.try_acquire_n(1)
    }

    /// Take `n` permits if they are all available
    pub fn try_acquire_n(&self, n: usize) -> Stm<bool> {
        self.permits
            .modify(move |available| match available.checked_sub(n) {
                Some(rest) => (true, rest),
                None => (false, *available),
            })
    }

    /// Return one permit
    pub fn release(&self) -> Stm<()> {
        self.release_n(1)
    }

    /// Return `n` permits
    pub fn release_n(&self, n: usize) -> Stm<()> {
        self.permits.update(move |available| available + n)
    }

    /// Run `f` while holding `n` permits
    ///
    /// Acquisition and release are separate transactions; the permits are
    /// returned even if `f` panics.
    pub fn with_permits<R, F>(&self, n: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.acquire_guard(n);
        f()
    }

    /// Run `f` while holding one permit
    pub fn with_permit<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.with_permits(1, f)
    }

    /// Block until `n` permits are taken, returning a guard that gives them
    /// back on drop
    pub fn acquire_guard(&self, n: usize) -> SemaphorePermit {
        // acquire_n never fails, so the only error is uninhabited
        match commit(&self.acquire_n(n)) {
            Ok(()) => {}
            Err(never) => match never {},
        }
        trace!(permits = n, "semaphore permits acquired");
        SemaphorePermit {
            semaphore: self.clone(),
            permits: n,
        }
    }
}

/// Permits held outside of a transaction
///
/// Dropping the guard releases the permits in a transaction of its own.
#[must_use = "permits are released as soon as the guard is dropped"]
pub struct SemaphorePermit {
    semaphore: TSemaphore,
    permits: usize,
}

impl SemaphorePermit {
    /// Number of permits held
    pub fn permits(&self) -> usize {
        self.permits
    }
}

impl fmt::Debug for SemaphorePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphorePermit")
            .field("permits", &self.permits)
            .finish()
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        if let Err(never) = commit(&self.semaphore.release_n(self.permits)) {
            match never {}
        }
        trace!(permits = self.permits, "semaphore permits released");
    }
}
