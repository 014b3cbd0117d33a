//! Host runtimes that turn a blocked attempt into a real suspension
//!
//! The manager never parks anything itself: [`TransactionManager::attempt`]
//! hands back [`Attempt::Blocked`] with the registration it installed. This
//! module provides the two hosts used in this workspace:
//!
//! - Threads: the caller parks on a condition variable until a todo fires.
//!   [`TransactionManager::commit_interruptible`] additionally watches an
//!   [`Interrupt`] token.
//! - Tokio tasks: the caller awaits a [`tokio::sync::Notify`]. Dropping the
//!   future (task abort, timeout, `select!`) is the interruption path.
//!
//! In both hosts the registration is dropped before the attempt reruns or
//! the call returns, which removes every todo the attempt installed.

use crate::manager::{Attempt, TransactionManager};
use crate::stm::Stm;
use crate::tref::{Todo, Wakeup};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessel_core::CommitError;
use tokio::sync::Notify;
use tracing::debug;

/// Blocks one thread until woken
#[derive(Default)]
struct Parker {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    fn park(&self) {
        let mut woken = self.woken.lock();
        while !*woken {
            self.condvar.wait(&mut woken);
        }
        *woken = false;
    }
}

impl Wakeup for Parker {
    fn wake(&self) {
        *self.woken.lock() = true;
        self.condvar.notify_all();
    }
}

#[derive(Default)]
struct InterruptState {
    interrupted: AtomicBool,
    parked: Mutex<Vec<Arc<Parker>>>,
}

/// Cancellation token for [`TransactionManager::commit_interruptible`]
///
/// Cloning shares the token. Once interrupted it stays interrupted.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptState>,
}

impl Interrupt {
    /// Create a token that is not interrupted
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every commit waiting on this token
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        for parker in self.inner.parked.lock().iter() {
            parker.wake();
        }
    }

    /// Check if the token has been interrupted
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    fn watch(&self, parker: &Arc<Parker>) {
        self.inner.parked.lock().push(Arc::clone(parker));
    }

    fn unwatch(&self, parker: &Arc<Parker>) {
        self.inner
            .parked
            .lock()
            .retain(|other| !Arc::ptr_eq(other, parker));
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

impl TransactionManager {
    /// Commit `stm`, parking the calling thread while it is blocked
    pub fn commit<A, E>(&self, stm: &Stm<A, E>) -> Result<A, E>
    where
        A: Send + 'static,
        E: Send + 'static,
    {
        let parker = Arc::new(Parker::default());
        let todo: Todo = parker.clone();
        loop {
            match self.attempt(stm, &todo) {
                Attempt::Committed(value) => return Ok(value),
                Attempt::Failed(error) => return Err(error),
                Attempt::Blocked(registration) => {
                    parker.park();
                    drop(registration);
                }
            }
        }
    }

    /// Commit `stm`, giving up if `interrupt` fires while it is blocked
    ///
    /// An interrupted commit has removed all of its wakeups by the time it
    /// returns [`CommitError::Interrupted`]. A transaction that can commit
    /// without blocking commits even if the token is already interrupted.
    pub fn commit_interruptible<A, E>(
        &self,
        stm: &Stm<A, E>,
        interrupt: &Interrupt,
    ) -> Result<A, CommitError<E>>
    where
        A: Send + 'static,
        E: Send + 'static,
    {
        let parker = Arc::new(Parker::default());
        let todo: Todo = parker.clone();
        interrupt.watch(&parker);

        let result = loop {
            match self.attempt(stm, &todo) {
                Attempt::Committed(value) => break Ok(value),
                Attempt::Failed(error) => break Err(CommitError::Failed(error)),
                Attempt::Blocked(registration) => {
                    if !interrupt.is_interrupted() {
                        parker.park();
                    }
                    drop(registration);
                    if interrupt.is_interrupted() {
                        debug!("blocked transaction interrupted");
                        break Err(CommitError::Interrupted);
                    }
                }
            }
        };

        interrupt.unwatch(&parker);
        result
    }

    /// Commit `stm` from an async task, awaiting while it is blocked
    ///
    /// Cancel-safe: dropping the future while it waits removes the
    /// transaction's wakeups and commits nothing.
    pub async fn commit_async<A, E>(&self, stm: &Stm<A, E>) -> Result<A, E>
    where
        A: Send + 'static,
        E: Send + 'static,
    {
        let signal = Arc::new(Notify::new());
        let todo: Todo = signal.clone();
        loop {
            match self.attempt(stm, &todo) {
                Attempt::Committed(value) => return Ok(value),
                Attempt::Failed(error) => return Err(error),
                Attempt::Blocked(registration) => {
                    signal.notified().await;
                    drop(registration);
                }
            }
        }
    }
}

/// Commit `stm` on the process-wide manager, parking while blocked
pub fn commit<A, E>(stm: &Stm<A, E>) -> Result<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    TransactionManager::global().commit(stm)
}

/// Commit `stm` on the process-wide manager from an async task
pub async fn commit_async<A, E>(stm: &Stm<A, E>) -> Result<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    TransactionManager::global().commit_async(stm).await
}

impl<A: Send + 'static, E: Send + 'static> Stm<A, E> {
    /// Commit on the process-wide manager, parking while blocked
    pub fn commit(&self) -> Result<A, E> {
        commit(self)
    }
}
