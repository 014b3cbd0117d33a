//! Transactional queue
//!
//! A FIFO queue whose operations compose with any other transaction.
//!
//! ## Strategies
//!
//! What happens when an offer finds the queue full:
//!
//! | Strategy     | `offer` on a full queue                  |
//! |--------------|------------------------------------------|
//! | BackPressure | retries until a taker makes room         |
//! | Dropping     | discards the new element, returns false  |
//! | Sliding      | evicts the oldest element, returns true  |
//!
//! Unbounded queues never fill up.
//!
//! ## Storage
//!
//! Bounded queues keep one ref per slot plus a single cursor ref holding
//! the `(head, tail)` pair, so an attempt always sees the two positions
//! from the same commit. Every offer and take reads the cursor, so a
//! producer and a consumer committing at the same time conflict on it.
//! Unbounded queues keep a single ref holding a shared deque.
//!
//! ## Shutdown
//!
//! Every operation reads the shutdown flag first. Once the queue is shut
//! down its contents are discarded and all operations except
//! [`TQueue::is_shutdown`] and [`TQueue::await_shutdown`] fail with
//! [`QueueError::Shutdown`]. Blocked takers and offerers are woken since
//! they read the flag.

use crate::error::QueueError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tessel_concurrency::{Journal, Stm, TRef, TxResult, TxSignal};
use tracing::debug;

/// Behavior of a bounded queue when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Offers wait for room
    BackPressure,
    /// New elements are discarded
    Dropping,
    /// Oldest elements are evicted
    Sliding,
}

enum Storage<A> {
    Ring {
        slots: Arc<[TRef<Option<A>>]>,
        /// `(head, tail)`: positions of the oldest element and the next free slot
        cursor: TRef<(u64, u64)>,
    },
    Sequence(TRef<Arc<VecDeque<A>>>),
}

impl<A> Clone for Storage<A> {
    fn clone(&self) -> Self {
        match self {
            Storage::Ring { slots, cursor } => Storage::Ring {
                slots: Arc::clone(slots),
                cursor: cursor.clone(),
            },
            Storage::Sequence(items) => Storage::Sequence(items.clone()),
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Storage<A> {
    fn ring(capacity: usize) -> Self {
        Storage::Ring {
            slots: (0..capacity).map(|_| TRef::new(None)).collect(),
            cursor: TRef::new((0, 0)),
        }
    }

    fn slot(slots: &[TRef<Option<A>>], position: u64) -> &TRef<Option<A>> {
        &slots[(position % slots.len() as u64) as usize]
    }

    fn len(&self, journal: &mut Journal) -> usize {
        match self {
            Storage::Ring { cursor, .. } => {
                let (head, tail) = journal.read(cursor);
                // a torn pair only comes from a stale journal, which commit rejects
                tail.saturating_sub(head) as usize
            }
            Storage::Sequence(items) => journal.inspect(items, |items| items.len()),
        }
    }

    /// Caller checks there is room
    fn push_back(&self, journal: &mut Journal, value: A) {
        match self {
            Storage::Ring { slots, cursor } => {
                let (head, tail) = journal.read(cursor);
                journal.write(Self::slot(slots, tail), Some(value));
                journal.write(cursor, (head, tail + 1));
            }
            Storage::Sequence(items) => {
                journal.mutate(items, |items| Arc::make_mut(items).push_back(value))
            }
        }
    }

    fn pop_front(&self, journal: &mut Journal) -> Option<A> {
        match self {
            Storage::Ring { slots, cursor } => {
                let (head, tail) = journal.read(cursor);
                if head >= tail {
                    return None;
                }
                let value = journal.mutate(Self::slot(slots, head), Option::take);
                journal.write(cursor, (head + 1, tail));
                value
            }
            Storage::Sequence(items) => {
                if journal.inspect(items, |items| items.is_empty()) {
                    return None;
                }
                journal.mutate(items, |items| Arc::make_mut(items).pop_front())
            }
        }
    }

    fn peek_front(&self, journal: &mut Journal) -> Option<A> {
        match self {
            Storage::Ring { slots, cursor } => {
                let (head, tail) = journal.read(cursor);
                if head >= tail {
                    return None;
                }
                journal.read(Self::slot(slots, head))
            }
            Storage::Sequence(items) => journal.inspect(items, |items| items.front().cloned()),
        }
    }

    fn clear(&self, journal: &mut Journal) {
        while self.pop_front(journal).is_some() {}
    }

    fn waiter_count(&self) -> usize {
        match self {
            Storage::Ring { slots, cursor } => {
                cursor.waiter_count() + slots.iter().map(TRef::waiter_count).sum::<usize>()
            }
            Storage::Sequence(items) => items.waiter_count(),
        }
    }
}

/// Transactional FIFO queue
///
/// Cloning shares the queue.
///
/// # Example
///
/// ```
/// use tessel_concurrency::commit;
/// use tessel_primitives::TQueue;
///
/// let queue = TQueue::bounded(2);
/// commit(&queue.offer_all(vec![1, 2])).unwrap();
/// assert!(!commit(&TQueue::dropping(1).offer_all(vec![1, 2])).unwrap());
/// assert_eq!(commit(&queue.take_all()).unwrap(), vec![1, 2]);
/// ```
pub struct TQueue<A> {
    storage: Storage<A>,
    capacity: usize,
    strategy: OverflowStrategy,
    shutdown: TRef<bool>,
}

impl<A> Clone for TQueue<A> {
    fn clone(&self) -> Self {
        TQueue {
            storage: self.storage.clone(),
            capacity: self.capacity,
            strategy: self.strategy,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<A> fmt::Debug for TQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TQueue")
            .field("capacity", &self.capacity)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> TQueue<A> {
    /// Bounded queue whose offers wait for room
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_strategy(capacity, OverflowStrategy::BackPressure)
    }

    /// Bounded queue that discards new elements when full
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn dropping(capacity: usize) -> Self {
        Self::with_strategy(capacity, OverflowStrategy::Dropping)
    }

    /// Bounded queue that evicts the oldest elements when full
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn sliding(capacity: usize) -> Self {
        Self::with_strategy(capacity, OverflowStrategy::Sliding)
    }

    /// Queue without a capacity limit
    pub fn unbounded() -> Self {
        TQueue {
            storage: Storage::Sequence(TRef::new(Arc::new(VecDeque::new()))),
            capacity: usize::MAX,
            strategy: OverflowStrategy::BackPressure,
            shutdown: TRef::new(false),
        }
    }

    /// Bounded queue with an explicit full-queue strategy
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_strategy(capacity: usize, strategy: OverflowStrategy) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        TQueue {
            storage: Storage::ring(capacity),
            capacity,
            strategy,
            shutdown: TRef::new(false),
        }
    }

    /// Maximum number of elements; `usize::MAX` for unbounded queues
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Full-queue strategy
    pub fn strategy(&self) -> OverflowStrategy {
        self.strategy
    }

    /// Add one element
    ///
    /// Returns false when a dropping queue discarded it.
    pub fn offer(&self, value: A) -> Stm<bool, QueueError> {
        self.access(move |queue, journal| {
            let size = queue.storage.len(journal);
            if size < queue.capacity {
                queue.storage.push_back(journal, value.clone());
                return Ok(true);
            }
            match queue.strategy {
                OverflowStrategy::BackPressure => Err(TxSignal::Retry),
                OverflowStrategy::Dropping => Ok(false),
                OverflowStrategy::Sliding => {
                    queue.storage.pop_front(journal);
                    queue.storage.push_back(journal, value.clone());
                    Ok(true)
                }
            }
        })
    }

    /// Add a batch of elements
    ///
    /// A back-pressured queue waits until the whole batch fits and fails
    /// with [`QueueError::BatchTooLarge`] if it never can. A dropping queue
    /// enqueues what fits and returns false if anything was discarded. A
    /// sliding queue keeps the newest elements.
    pub fn offer_all(&self, values: Vec<A>) -> Stm<bool, QueueError> {
        self.access(move |queue, journal| {
            let size = queue.storage.len(journal);
            let free = queue.capacity.saturating_sub(size);
            match queue.strategy {
                OverflowStrategy::BackPressure => {
                    if values.len() > queue.capacity {
                        return Err(TxSignal::Fail(QueueError::BatchTooLarge {
                            batch: values.len(),
                            capacity: queue.capacity,
                        }));
                    }
                    if values.len() > free {
                        return Err(TxSignal::Retry);
                    }
                    for value in &values {
                        queue.storage.push_back(journal, value.clone());
                    }
                    Ok(true)
                }
                OverflowStrategy::Dropping => {
                    for value in values.iter().take(free) {
                        queue.storage.push_back(journal, value.clone());
                    }
                    Ok(values.len() <= free)
                }
                OverflowStrategy::Sliding => {
                    let keep = values.len().min(queue.capacity);
                    let mut size = size;
                    for value in &values[values.len() - keep..] {
                        if size == queue.capacity {
                            queue.storage.pop_front(journal);
                        } else {
                            size += 1;
                        }
                        queue.storage.push_back(journal, value.clone());
                    }
                    Ok(true)
                }
            }
        })
    }

    /// Remove the oldest element, retrying while the queue is empty
    pub fn take(&self) -> Stm<A, QueueError> {
        self.access(|queue, journal| queue.storage.pop_front(journal).ok_or(TxSignal::Retry))
    }

    /// Remove the oldest element if there is one
    pub fn poll(&self) -> Stm<Option<A>, QueueError> {
        self.access(|queue, journal| Ok(queue.storage.pop_front(journal)))
    }

    /// Remove up to `max` elements without waiting
    pub fn take_up_to(&self, max: usize) -> Stm<Vec<A>, QueueError> {
        self.access(move |queue, journal| Ok(queue.drain(journal, max)))
    }

    /// Remove every element without waiting
    pub fn take_all(&self) -> Stm<Vec<A>, QueueError> {
        self.take_up_to(usize::MAX)
    }

    /// Remove at least `min` and at most `max` elements, retrying until
    /// `min` are available
    ///
    /// Returns nothing when `max < min`.
    pub fn take_between(&self, min: usize, max: usize) -> Stm<Vec<A>, QueueError> {
        self.access(move |queue, journal| {
            if max < min {
                return Ok(Vec::new());
            }
            if queue.storage.len(journal) < min {
                return Err(TxSignal::Retry);
            }
            Ok(queue.drain(journal, max))
        })
    }

    /// Remove exactly `n` elements, retrying until they are available
    pub fn take_n(&self, n: usize) -> Stm<Vec<A>, QueueError> {
        self.take_between(n, n)
    }

    /// Oldest element without removing it, retrying while empty
    pub fn peek(&self) -> Stm<A, QueueError> {
        self.access(|queue, journal| queue.storage.peek_front(journal).ok_or(TxSignal::Retry))
    }

    /// Oldest element without removing it, if any
    pub fn peek_option(&self) -> Stm<Option<A>, QueueError> {
        self.access(|queue, journal| Ok(queue.storage.peek_front(journal)))
    }

    /// Drop elements up to and including the first one matching
    /// `predicate`, returning it
    ///
    /// Retries when no element matches; the dropped elements stay in the
    /// queue in that case.
    pub fn seek<P>(&self, predicate: P) -> Stm<A, QueueError>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.access(move |queue, journal| {
            while let Some(value) = queue.storage.pop_front(journal) {
                if predicate(&value) {
                    return Ok(value);
                }
            }
            Err(TxSignal::Retry)
        })
    }

    /// Number of queued elements
    pub fn size(&self) -> Stm<usize, QueueError> {
        self.access(|queue, journal| Ok(queue.storage.len(journal)))
    }

    /// Check if the queue holds no elements
    pub fn is_empty(&self) -> Stm<bool, QueueError> {
        self.size().map(|size| size == 0)
    }

    /// Check if the queue is at capacity
    pub fn is_full(&self) -> Stm<bool, QueueError> {
        let capacity = self.capacity;
        self.size().map(move |size| size >= capacity)
    }

    /// Discard the contents and fail all further operations
    pub fn shutdown(&self) -> Stm<()> {
        let queue = self.clone();
        Stm::with_journal(move |journal| {
            if !journal.read(&queue.shutdown) {
                queue.storage.clear(journal);
                journal.write(&queue.shutdown, true);
                debug!(capacity = queue.capacity, "queue shut down");
            }
            Ok(())
        })
    }

    /// Check if the queue has been shut down
    pub fn is_shutdown(&self) -> Stm<bool> {
        self.shutdown.get()
    }

    /// Retry until the queue is shut down
    pub fn await_shutdown(&self) -> Stm<()> {
        self.is_shutdown().and_then(Stm::check)
    }

    /// Number of blocked transactions waiting on any of the queue's refs
    ///
    /// A transaction touching several of the refs counts once per ref.
    pub fn waiter_count(&self) -> usize {
        self.shutdown.waiter_count() + self.storage.waiter_count()
    }

    fn drain(&self, journal: &mut Journal, max: usize) -> Vec<A> {
        let count = self.storage.len(journal).min(max);
        (0..count)
            .filter_map(|_| self.storage.pop_front(journal))
            .collect()
    }

    /// Journal step that fails once the queue is shut down
    fn access<B, F>(&self, f: F) -> Stm<B, QueueError>
    where
        B: Send + 'static,
        F: Fn(&Self, &mut Journal) -> TxResult<B, QueueError> + Send + Sync + 'static,
    {
        let queue = self.clone();
        Stm::with_journal(move |journal| {
            if journal.read(&queue.shutdown) {
                return Err(TxSignal::Fail(QueueError::Shutdown));
            }
            f(&queue, journal)
        })
    }
}
