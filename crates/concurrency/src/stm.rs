//! Transaction descriptions
//!
//! An [`Stm<A, E>`] is a pure, re-runnable description of a transaction that
//! produces an `A` or fails with an `E`. Building one has no effect; only
//! committing it through a [`TransactionManager`](crate::TransactionManager)
//! runs it, possibly several times.
//!
//! Descriptions are trees of nodes. Combinators wrap their operands in a
//! new node instead of nesting closures, and the evaluator walks the tree
//! with an explicit continuation stack, so long `and_then` chains never grow
//! the call stack.
//!
//! ## Purity Requirement
//!
//! Closures passed to combinators may run many times (conflicts restart the
//! whole transaction) and may observe values that never commit. They must
//! not perform I/O or mutate anything outside the transaction.

use crate::journal::Journal;
use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type AnyValue = Box<dyn Any + Send>;
pub(crate) type ValueFn = Arc<dyn Fn() -> AnyValue + Send + Sync>;
pub(crate) type AccessFn = Arc<dyn Fn(&mut Journal) -> Result<AnyValue, Abort> + Send + Sync>;
pub(crate) type MapFn = Arc<dyn Fn(AnyValue) -> AnyValue + Send + Sync>;
pub(crate) type BindFn = Arc<dyn Fn(AnyValue) -> Arc<Node> + Send + Sync>;
pub(crate) type LazyFn = Arc<dyn Fn() -> Arc<Node> + Send + Sync>;

/// Why a journal access did not produce a value
pub(crate) enum Abort {
    Retry,
    Fail(AnyValue),
}

/// Early exit from a [`Stm::with_journal`] closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxSignal<E> {
    /// Block until one of the refs touched so far changes, then rerun
    Retry,
    /// Abort the transaction with a typed error
    Fail(E),
}

/// Result of a [`Stm::with_journal`] closure
pub type TxResult<A, E> = Result<A, TxSignal<E>>;

/// One node of a transaction description
pub(crate) enum Node {
    Succeed(ValueFn),
    Fail(ValueFn),
    Retry,
    Access(AccessFn),
    Suspend(LazyFn),
    Map(Arc<Node>, MapFn),
    MapErr(Arc<Node>, MapFn),
    FlatMap(Arc<Node>, BindFn),
    /// Run `right` when `left` retries, or also when it fails if `on_failure`
    Alternative {
        left: Arc<Node>,
        right: Arc<Node>,
        on_failure: bool,
    },
    CatchAll(Arc<Node>, BindFn),
    Fold {
        inner: Arc<Node>,
        on_success: MapFn,
        on_failure: MapFn,
    },
    /// Run every node in order, producing a `Vec<AnyValue>`
    Collect(Arc<[Arc<Node>]>),
}

/// Recover a typed value from the evaluator
///
/// Node construction is the only producer of values, and every node is built
/// by a typed `Stm` method, so the downcast cannot miss.
pub(crate) fn unbox<T: 'static>(value: AnyValue) -> T {
    match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => unreachable!(
            "transaction produced a value that is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

fn boxed<T: Send + 'static>(value: T) -> AnyValue {
    Box::new(value)
}

/// A composable transaction description
///
/// # Example
///
/// ```
/// use tessel_concurrency::{commit, Stm, TRef};
///
/// let from = TRef::new(100);
/// let to = TRef::new(0);
///
/// let transfer = {
///     let (from, to) = (from.clone(), to.clone());
///     from.get().and_then(move |balance| {
///         let (from, to) = (from.clone(), to.clone());
///         Stm::check(balance >= 30)
///             .then(from.update(|b| b - 30))
///             .then(to.update(|b| b + 30))
///     })
/// };
///
/// commit(&transfer).unwrap();
/// assert_eq!(commit(&from.get().zip(to.get())).unwrap(), (70, 30));
/// ```
pub struct Stm<A, E = Infallible> {
    node: Arc<Node>,
    _marker: PhantomData<fn() -> (A, E)>,
}

impl<A, E> Clone for Stm<A, E> {
    fn clone(&self) -> Self {
        Stm {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<A, E> fmt::Debug for Stm<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stm")
            .field("value", &std::any::type_name::<A>())
            .field("error", &std::any::type_name::<E>())
            .finish()
    }
}

impl<A, E> Stm<A, E> {
    fn from_node(node: Node) -> Self {
        Self::from_arc(Arc::new(node))
    }

    fn from_arc(node: Arc<Node>) -> Self {
        Stm {
            node,
            _marker: PhantomData,
        }
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

impl<A: Send + 'static, E: Send + 'static> Stm<A, E> {
    /// Transaction that produces `value`
    pub fn succeed(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self::from_node(Node::Succeed(Arc::new(move || boxed(value.clone()))))
    }

    /// Transaction that produces the result of `f`
    pub fn succeed_with<F>(f: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::from_node(Node::Succeed(Arc::new(move || boxed(f()))))
    }

    /// Transaction that fails with `error`
    pub fn fail(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Self::from_node(Node::Fail(Arc::new(move || boxed(error.clone()))))
    }

    /// Transaction that blocks until a ref it read changes
    ///
    /// A transaction that retries before touching any ref blocks forever.
    pub fn retry() -> Self {
        Self::from_node(Node::Retry)
    }

    /// Defer building the description until evaluation
    pub fn suspend<F>(f: F) -> Self
    where
        F: Fn() -> Stm<A, E> + Send + Sync + 'static,
    {
        Self::from_node(Node::Suspend(Arc::new(move || f().node)))
    }

    /// Primitive transaction operating on the attempt's journal
    ///
    /// This is the building block behind every ref operation. The closure
    /// must only reach shared state through the journal.
    pub fn with_journal<F>(f: F) -> Self
    where
        F: Fn(&mut Journal) -> TxResult<A, E> + Send + Sync + 'static,
    {
        Self::from_node(Node::Access(Arc::new(move |journal| {
            f(journal).map(boxed).map_err(|signal| match signal {
                TxSignal::Retry => Abort::Retry,
                TxSignal::Fail(e) => Abort::Fail(boxed(e)),
            })
        })))
    }

    /// Transform the result
    pub fn map<B, F>(self, f: F) -> Stm<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        Stm::from_node(Node::Map(
            self.node,
            Arc::new(move |value| boxed(f(unbox::<A>(value)))),
        ))
    }

    /// Transform the error
    pub fn map_err<E2, F>(self, f: F) -> Stm<A, E2>
    where
        E2: Send + 'static,
        F: Fn(E) -> E2 + Send + Sync + 'static,
    {
        Stm::from_node(Node::MapErr(
            self.node,
            Arc::new(move |error| boxed(f(unbox::<E>(error)))),
        ))
    }

    /// Sequence a transaction that depends on this one's result
    pub fn and_then<B, F>(self, f: F) -> Stm<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> Stm<B, E> + Send + Sync + 'static,
    {
        Stm::from_node(Node::FlatMap(
            self.node,
            Arc::new(move |value| f(unbox::<A>(value)).node),
        ))
    }

    /// Run `next` after this transaction, keeping only its result
    pub fn then<B>(self, next: Stm<B, E>) -> Stm<B, E>
    where
        B: Send + 'static,
    {
        Stm::from_node(Node::FlatMap(
            self.node,
            Arc::new(move |_| Arc::clone(&next.node)),
        ))
    }

    /// Run both transactions in order and pair their results
    pub fn zip<B>(self, other: Stm<B, E>) -> Stm<(A, B), E>
    where
        B: Send + 'static,
    {
        self.zip_with(other, |a, b| (a, b))
    }

    /// Run both transactions in order and combine their results
    pub fn zip_with<B, C, F>(self, other: Stm<B, E>, f: F) -> Stm<C, E>
    where
        B: Send + 'static,
        C: Send + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        let pair: Arc<[Arc<Node>]> = Arc::from(vec![self.node, other.node]);
        Stm::from_node(Node::Map(
            Arc::new(Node::Collect(pair)),
            Arc::new(move |values| {
                let mut values = unbox::<Vec<AnyValue>>(values).into_iter();
                match (values.next(), values.next()) {
                    (Some(a), Some(b)) => boxed(f(unbox::<A>(a), unbox::<B>(b))),
                    _ => unreachable!("zip collected fewer than two values"),
                }
            }),
        ))
    }

    /// Try this transaction; if it retries or fails, run `that` instead
    ///
    /// Writes made by this transaction are rolled back before `that` runs.
    pub fn or_else<E2>(self, that: Stm<A, E2>) -> Stm<A, E2>
    where
        E2: Send + 'static,
    {
        Stm::from_node(Node::Alternative {
            left: self.node,
            right: that.node,
            on_failure: true,
        })
    }

    /// Try this transaction; if it retries, run `that` instead
    ///
    /// Failures propagate. Writes made by this transaction are rolled back
    /// before `that` runs.
    pub fn or_try(self, that: Stm<A, E>) -> Stm<A, E> {
        Stm::from_node(Node::Alternative {
            left: self.node,
            right: that.node,
            on_failure: false,
        })
    }

    /// Recover from a failure with another transaction
    ///
    /// Writes made by this transaction are rolled back before the handler's
    /// transaction runs. Retries propagate.
    pub fn catch_all<E2, F>(self, f: F) -> Stm<A, E2>
    where
        E2: Send + 'static,
        F: Fn(E) -> Stm<A, E2> + Send + Sync + 'static,
    {
        Stm::from_node(Node::CatchAll(
            self.node,
            Arc::new(move |error| f(unbox::<E>(error)).node),
        ))
    }

    /// Surface the failure as a value; a failed branch's writes are rolled
    /// back
    pub fn either<E2>(self) -> Stm<Result<A, E>, E2>
    where
        E2: Send + 'static,
    {
        Stm::from_node(Node::Fold {
            inner: self.node,
            on_success: Arc::new(|value| boxed(Ok::<A, E>(unbox::<A>(value)))),
            on_failure: Arc::new(|error| boxed(Err::<A, E>(unbox::<E>(error)))),
        })
    }

    /// Run only when `condition` holds
    pub fn when(self, condition: bool) -> Stm<Option<A>, E> {
        if condition {
            self.map(Some)
        } else {
            Stm::succeed_with(|| None)
        }
    }

    /// Run every transaction in order and collect the results
    pub fn collect_all<I>(items: I) -> Stm<Vec<A>, E>
    where
        I: IntoIterator<Item = Stm<A, E>>,
    {
        let nodes: Arc<[Arc<Node>]> = items.into_iter().map(|stm| stm.node).collect();
        Stm::from_node(Node::Map(
            Arc::new(Node::Collect(nodes)),
            Arc::new(|values| {
                boxed(
                    unbox::<Vec<AnyValue>>(values)
                        .into_iter()
                        .map(unbox::<A>)
                        .collect::<Vec<A>>(),
                )
            }),
        ))
    }

    /// Build one transaction per item and run them in order
    pub fn for_each<T, I, F>(items: I, f: F) -> Stm<Vec<A>, E>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> Stm<A, E>,
    {
        Self::collect_all(items.into_iter().map(f))
    }
}

impl<E: Send + 'static> Stm<(), E> {
    /// Succeed when `condition` holds, retry otherwise
    pub fn check(condition: bool) -> Self {
        if condition {
            Stm::succeed(())
        } else {
            Stm::retry()
        }
    }
}

impl<A: Send + 'static> Stm<A, Infallible> {
    /// Reuse an infallible transaction where a typed error is expected
    pub fn lift<E: Send + 'static>(self) -> Stm<A, E> {
        Stm::from_arc(self.node)
    }
}
