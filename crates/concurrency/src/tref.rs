//! Transactional cells
//!
//! A [`TRef`] owns one [`Versioned`] value and a registry of wakeup
//! callbacks ("todos") left by transactions blocked in explicit retry.
//!
//! ## Access Rules
//!
//! - Evaluation never touches the committed value except to take the
//!   first-touch snapshot; every read and write goes through the attempt's
//!   [`Journal`](crate::Journal).
//! - The committed value and the todo registry change only while the
//!   cell's commit stripe is held (commit, block registration,
//!   deregistration).
//!
//! Two refs holding equal values are still different refs: equality and
//! hashing use the [`RefId`] handle.

use crate::stm::Stm;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tessel_core::{RefId, TxnId, Versioned};

/// One-shot wakeup supplied by the host runtime
///
/// Registered on every ref a blocked transaction touched. Invoked at most
/// once per registration, after the commit that changed the ref has
/// released its locks.
pub trait Wakeup: Send + Sync {
    /// Resume the blocked transaction
    fn wake(&self);
}

/// Registered wakeup callback
pub type Todo = Arc<dyn Wakeup>;

impl Wakeup for tokio::sync::Notify {
    fn wake(&self) {
        // notify_one stores a permit when nobody is waiting yet
        self.notify_one();
    }
}

struct CellState<A> {
    versioned: Versioned<A>,
    todos: FxHashMap<TxnId, Todo>,
}

pub(crate) struct Cell<A> {
    id: RefId,
    state: Mutex<CellState<A>>,
}

impl<A: Clone> Cell<A> {
    fn new(value: A) -> Self {
        Cell {
            id: RefId::next(),
            state: Mutex::new(CellState {
                versioned: Versioned::new(value),
                todos: FxHashMap::default(),
            }),
        }
    }

    /// Consistent (value, version) pair of the committed state
    pub(crate) fn snapshot(&self) -> Versioned<A> {
        self.state.lock().versioned.clone()
    }

    /// Install a new committed value and hand back the todos to run
    ///
    /// Caller must hold this cell's commit stripe and have validated that
    /// `observed` is still the live version.
    pub(crate) fn publish(&self, value: A, observed: u64) -> Vec<Todo> {
        let mut state = self.state.lock();
        debug_assert_eq!(state.versioned.version, observed);
        state.versioned = state.versioned.succeed(value);
        state.todos.drain().map(|(_, todo)| todo).collect()
    }
}

/// Type-erased view of a cell used by commit and wakeup bookkeeping
pub(crate) trait Watch: Send + Sync {
    fn id(&self) -> RefId;
    fn version(&self) -> u64;
    fn add_todo(&self, txn: TxnId, todo: Todo);
    fn remove_todo(&self, txn: TxnId);
    fn todo_count(&self) -> usize;
}

impl<A: Send + Sync> Watch for Cell<A> {
    fn id(&self) -> RefId {
        self.id
    }

    fn version(&self) -> u64 {
        self.state.lock().versioned.version
    }

    fn add_todo(&self, txn: TxnId, todo: Todo) {
        self.state.lock().todos.insert(txn, todo);
    }

    fn remove_todo(&self, txn: TxnId) {
        self.state.lock().todos.remove(&txn);
    }

    fn todo_count(&self) -> usize {
        self.state.lock().todos.len()
    }
}

/// A transactional cell
///
/// Refs are cheap handles; cloning shares the same cell.
///
/// # Example
///
/// ```
/// use tessel_concurrency::{commit, TRef};
///
/// let counter = TRef::new(0);
/// commit(&counter.update(|n| n + 1)).unwrap();
/// assert_eq!(commit(&counter.get()).unwrap(), 1);
/// ```
pub struct TRef<A> {
    cell: Arc<Cell<A>>,
}

impl<A> Clone for TRef<A> {
    fn clone(&self) -> Self {
        TRef {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<A> PartialEq for TRef<A> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl<A> Eq for TRef<A> {}

impl<A> Hash for TRef<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.id.hash(state);
    }
}

impl<A> fmt::Debug for TRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TRef").field(&self.cell.id).finish()
    }
}

impl<A> TRef<A> {
    /// Stable handle of this cell
    pub fn id(&self) -> RefId {
        self.cell.id
    }

    pub(crate) fn cell(&self) -> &Arc<Cell<A>> {
        &self.cell
    }
}

impl<A: Clone + Send + Sync + 'static> TRef<A> {
    /// Allocate a committed cell outside of any transaction
    pub fn new(initial: A) -> Self {
        TRef {
            cell: Arc::new(Cell::new(initial)),
        }
    }

    /// Allocate a cell inside the current transaction
    ///
    /// The ref is visible to the rest of the transaction immediately and to
    /// everyone else once the transaction commits. It is exempt from
    /// conflict checks in the creating attempt since nobody else can hold it.
    pub fn make(initial: A) -> Stm<TRef<A>> {
        Stm::with_journal(move |journal| Ok(journal.new_ref(initial.clone())))
    }

    /// Current value of the cell as seen by the transaction
    pub fn get(&self) -> Stm<A> {
        let tref = self.clone();
        Stm::with_journal(move |journal| Ok(journal.read(&tref)))
    }

    /// Replace the value
    pub fn set(&self, value: A) -> Stm<()> {
        self.modify(move |_| ((), value.clone()))
    }

    /// Apply `f` to the value, store its second result and return the first
    pub fn modify<B, F>(&self, f: F) -> Stm<B>
    where
        B: Send + 'static,
        F: Fn(&A) -> (B, A) + Send + Sync + 'static,
    {
        let tref = self.clone();
        Stm::with_journal(move |journal| Ok(journal.modify(&tref, &f)))
    }

    /// Like [`TRef::modify`], but only when `f` returns `Some`; otherwise
    /// returns `default` and leaves the value untouched
    pub fn modify_some<B, F>(&self, default: B, f: F) -> Stm<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(&A) -> Option<(B, A)> + Send + Sync + 'static,
    {
        let tref = self.clone();
        Stm::with_journal(move |journal| {
            let current = journal.read(&tref);
            Ok(match f(&current) {
                Some((out, next)) => {
                    journal.write(&tref, next);
                    out
                }
                None => default.clone(),
            })
        })
    }

    /// Apply `f` to the value
    pub fn update<F>(&self, f: F) -> Stm<()>
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        self.modify(move |a| ((), f(a)))
    }

    /// Apply `f` and return the new value
    pub fn update_and_get<F>(&self, f: F) -> Stm<A>
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        self.modify(move |a| {
            let next = f(a);
            (next.clone(), next)
        })
    }

    /// Apply `f` and return the previous value
    pub fn get_and_update<F>(&self, f: F) -> Stm<A>
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        self.modify(move |a| (a.clone(), f(a)))
    }

    /// Replace the value and return the previous one
    pub fn get_and_set(&self, value: A) -> Stm<A> {
        self.modify(move |a| (a.clone(), value.clone()))
    }

    /// Apply `f` when it returns `Some`
    pub fn update_some<F>(&self, f: F) -> Stm<()>
    where
        F: Fn(&A) -> Option<A> + Send + Sync + 'static,
    {
        self.modify_some((), move |a| f(a).map(|next| ((), next)))
    }

    /// Apply `f` when it returns `Some`, returning the value afterwards
    pub fn update_some_and_get<F>(&self, f: F) -> Stm<A>
    where
        F: Fn(&A) -> Option<A> + Send + Sync + 'static,
    {
        let tref = self.clone();
        Stm::with_journal(move |journal| {
            let current = journal.read(&tref);
            Ok(match f(&current) {
                Some(next) => {
                    journal.write(&tref, next.clone());
                    next
                }
                None => current,
            })
        })
    }

    /// Apply `f` when it returns `Some`, returning the value beforehand
    pub fn get_and_update_some<F>(&self, f: F) -> Stm<A>
    where
        F: Fn(&A) -> Option<A> + Send + Sync + 'static,
    {
        let tref = self.clone();
        Stm::with_journal(move |journal| {
            let current = journal.read(&tref);
            if let Some(next) = f(&current) {
                journal.write(&tref, next);
            }
            Ok(current)
        })
    }

    /// Number of blocked transactions currently waiting on this cell
    pub fn waiter_count(&self) -> usize {
        self.cell.todo_count()
    }
}
