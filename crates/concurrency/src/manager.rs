//! Transaction manager for coordinating commit operations
//!
//! Drives one transaction description to completion by orchestrating:
//! 1. Evaluation against a fresh journal
//! 2. Validation (every touched ref still at its first-touch version)
//! 3. Publication of changed refs and wakeup of blocked transactions
//!
//! Core Invariants:
//! - All-or-nothing commit: every changed ref is published, or none is
//! - A conflict is never visible to the caller; it restarts the attempt
//! - A blocked attempt's wakeups are removed before it reruns or returns
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Allocate TxnId, create empty Journal
//! 2. evaluate() - run the description against the journal
//! 3. Succeed: lock stripes -> validate -> publish -> unlock -> run todos
//! 4. Invalid (at any check): discard journal, goto 1
//! 5. Retry: lock stripes -> validate -> register todos -> unlock -> Blocked
//! 6. Fail: check journal consistency -> return the typed error
//! ```
//!
//! The host runtime turns `Blocked` into a real suspension; see
//! [`crate::runtime`].

use crate::evaluator::{evaluate, Exit};
use crate::journal::Journal;
use crate::locks::COMMIT_LOCKS;
use crate::stm::{unbox, Stm};
use crate::tref::{Todo, Watch};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessel_core::{StmConfig, TxnId};
use tracing::{debug, trace, warn};

static GLOBAL: Lazy<TransactionManager> = Lazy::new(TransactionManager::default);

/// Result of driving a transaction until it commits, fails, or blocks
pub enum Attempt<A, E> {
    /// The transaction committed and produced a value
    Committed(A),
    /// The transaction failed with its declared error; nothing was committed
    Failed(E),
    /// The transaction is waiting for one of the refs it touched to change
    Blocked(Registration),
}

impl<A, E> fmt::Debug for Attempt<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Committed(_) => f.write_str("Committed"),
            Attempt::Failed(_) => f.write_str("Failed"),
            Attempt::Blocked(registration) => f.debug_tuple("Blocked").field(registration).finish(),
        }
    }
}

/// Wakeup registrations of one blocked attempt
///
/// Dropping the registration removes the attempt's todo from every ref it
/// was installed on. Hosts drop it after being woken, or when the waiting
/// caller is interrupted, so no callback outlives its transaction.
pub struct Registration {
    txn_id: TxnId,
    watched: Vec<Arc<dyn Watch>>,
}

impl Registration {
    /// Attempt that registered the wakeups
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Number of refs being watched
    pub fn watched_refs(&self) -> usize {
        self.watched.len()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("txn_id", &self.txn_id)
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _stripes = COMMIT_LOCKS.lock(self.watched.iter().map(|cell| cell.id()));
        for cell in &self.watched {
            cell.remove_todo(self.txn_id);
        }
        trace!(txn = %self.txn_id, refs = self.watched.len(), "wakeups removed");
    }
}

/// Counters describing what a manager has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StmStats {
    /// Successful commits
    pub commits: u64,
    /// Attempts restarted because a touched ref changed underneath them
    pub conflicts: u64,
    /// Attempts that blocked in explicit retry
    pub blocks: u64,
    /// Transactions that ended with their typed error
    pub failures: u64,
}

struct Conflict;

/// Manages transaction attempts and atomic commits
///
/// TransactionManager coordinates the commit protocol:
/// - Evaluation against a per-attempt journal
/// - Validation against the live versions of every touched ref
/// - Publication of changed refs and wakeup of blocked transactions
///
/// Managers carry configuration and statistics only. Refs and the commit
/// lock table are process-wide, so refs may be used with any manager.
///
/// # Thread Safety
///
/// Validation and publication happen under the stripes of every touched ref.
/// This prevents the TOCTOU race where validation passes but another commit
/// changes a ref before publication.
pub struct TransactionManager {
    config: StmConfig,
    commits: AtomicU64,
    conflicts: AtomicU64,
    blocks: AtomicU64,
    failures: AtomicU64,
}

impl TransactionManager {
    /// Create a transaction manager
    pub fn new(config: StmConfig) -> Self {
        TransactionManager {
            config,
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Process-wide manager with default configuration
    pub fn global() -> &'static TransactionManager {
        &GLOBAL
    }

    /// Active configuration
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> StmStats {
        StmStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Run `stm` until it commits, fails, or blocks
    ///
    /// Conflicts are retried here without backoff: a conflict means another
    /// transaction committed, so the next snapshot is newer. When the
    /// transaction blocks, `todo` is registered on every ref it touched and
    /// the returned [`Registration`] must be kept alive until the host has
    /// either been woken or given up.
    pub fn attempt<A, E>(&self, stm: &Stm<A, E>, todo: &Todo) -> Attempt<A, E>
    where
        A: Send + 'static,
        E: Send + 'static,
    {
        let mut conflicts: u32 = 0;
        loop {
            let txn_id = TxnId::next();
            let mut journal = Journal::new();

            let outcome = match evaluate(stm.node(), &mut journal, &self.config) {
                Exit::Succeed(value) => self
                    .try_commit(txn_id, journal)
                    .map(|()| Attempt::Committed(unbox::<A>(value))),
                Exit::Fail(error) => {
                    if journal.is_valid() {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        debug!(txn = %txn_id, "transaction failed");
                        Ok(Attempt::Failed(unbox::<E>(error)))
                    } else {
                        Err(Conflict)
                    }
                }
                Exit::Retry => self
                    .try_block(txn_id, journal, todo)
                    .map(Attempt::Blocked),
                Exit::Invalid => Err(Conflict),
            };

            match outcome {
                Ok(attempt) => return attempt,
                Err(Conflict) => {
                    conflicts += 1;
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    debug!(txn = %txn_id, conflicts, "transaction conflict, restarting");
                    if conflicts == self.config.conflict_warn_threshold {
                        warn!(
                            conflicts,
                            "transaction keeps conflicting; contention on its refs is high"
                        );
                    }
                }
            }
        }
    }

    /// Validate and publish under the stripes of every touched ref
    fn try_commit(&self, txn_id: TxnId, journal: Journal) -> Result<(), Conflict> {
        let stripes = COMMIT_LOCKS.lock(journal.ids());
        if !journal.is_valid() {
            return Err(Conflict);
        }

        let refs = journal.len();
        let todos = journal.publish();
        drop(stripes);

        self.commits.fetch_add(1, Ordering::Relaxed);
        trace!(txn = %txn_id, refs, wakeups = todos.len(), "transaction committed");
        for todo in todos {
            todo.wake();
        }
        Ok(())
    }

    /// Register `todo` on every touched ref, unless the journal is already
    /// stale, in which case the change it would wait for has happened
    fn try_block(
        &self,
        txn_id: TxnId,
        journal: Journal,
        todo: &Todo,
    ) -> Result<Registration, Conflict> {
        let _stripes = COMMIT_LOCKS.lock(journal.ids());
        if !journal.is_valid() {
            return Err(Conflict);
        }

        let watched = journal.watches();
        for cell in &watched {
            cell.add_todo(txn_id, Arc::clone(todo));
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);
        debug!(txn = %txn_id, refs = watched.len(), "transaction blocked in retry");
        Ok(Registration { txn_id, watched })
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(StmConfig::default())
    }
}
