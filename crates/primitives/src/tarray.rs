//! Transactional array
//!
//! A fixed-length sequence of [`TRef`] cells. Every element is its own ref,
//! so transactions touching disjoint indices never conflict, while scans and
//! folds observe all elements at one consistent point.
//!
//! The length is fixed at construction. Out-of-range access fails the
//! transaction with [`ArrayError::IndexOutOfBounds`].

use crate::error::ArrayError;
use std::fmt;
use std::sync::Arc;
use tessel_concurrency::{Journal, Stm, TRef};

/// Fixed-length array of transactional cells
pub struct TArray<A> {
    cells: Arc<[TRef<A>]>,
}

impl<A> Clone for TArray<A> {
    fn clone(&self) -> Self {
        TArray {
            cells: Arc::clone(&self.cells),
        }
    }
}

impl<A> fmt::Debug for TArray<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TArray").field("len", &self.cells.len()).finish()
    }
}

impl<A> TArray<A> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, index: usize) -> Result<&TRef<A>, ArrayError> {
        self.cells.get(index).ok_or(ArrayError::IndexOutOfBounds {
            index,
            len: self.cells.len(),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> TArray<A> {
    /// Build a committed array outside of any transaction
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = A>,
    {
        TArray {
            cells: values.into_iter().map(TRef::new).collect(),
        }
    }

    /// Array with no elements
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Build an array inside the current transaction
    pub fn make(values: Vec<A>) -> Stm<TArray<A>> {
        Stm::with_journal(move |journal| {
            Ok(TArray {
                cells: values
                    .iter()
                    .map(|value| journal.new_ref(value.clone()))
                    .collect(),
            })
        })
    }

    /// Build an array inside the current transaction from any iterable
    pub fn from_iterable<I>(values: I) -> Stm<TArray<A>>
    where
        I: IntoIterator<Item = A>,
    {
        Self::make(values.into_iter().collect())
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Stm<A, ArrayError> {
        match self.cell(index) {
            Ok(cell) => cell.get().lift(),
            Err(error) => Stm::fail(error),
        }
    }

    /// Replace the element at `index`
    pub fn set(&self, index: usize, value: A) -> Stm<(), ArrayError> {
        match self.cell(index) {
            Ok(cell) => cell.set(value).lift(),
            Err(error) => Stm::fail(error),
        }
    }

    /// Apply `f` to the element at `index`
    pub fn update<F>(&self, index: usize, f: F) -> Stm<(), ArrayError>
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        match self.cell(index) {
            Ok(cell) => cell.update(f).lift(),
            Err(error) => Stm::fail(error),
        }
    }

    /// Replace the element at `index` with the result of a transaction
    pub fn update_stm<E, F>(&self, index: usize, f: F) -> Stm<(), E>
    where
        E: From<ArrayError> + Clone + Send + Sync + 'static,
        F: Fn(A) -> Stm<A, E> + Send + Sync + 'static,
    {
        let cell = match self.cell(index) {
            Ok(cell) => cell.clone(),
            Err(error) => return Stm::fail(error.into()),
        };
        let target = cell.clone();
        cell.get()
            .lift()
            .and_then(f)
            .and_then(move |next| target.set(next).lift())
    }

    /// Snapshot of every element
    pub fn to_vec(&self) -> Stm<Vec<A>> {
        self.scan(|journal, cells| cells.iter().map(|cell| journal.read(cell)).collect())
    }

    /// Run a transaction for every element in order
    pub fn for_each<E, F>(&self, f: F) -> Stm<(), E>
    where
        E: Send + 'static,
        F: Fn(A) -> Stm<(), E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Stm::for_each(self.cells.iter().cloned(), move |cell| {
            let f = Arc::clone(&f);
            cell.get().lift().and_then(move |value| f(value))
        })
        .map(|_| ())
    }

    /// First element for which `pf` is defined, mapped through it
    pub fn collect_first<B, F>(&self, pf: F) -> Stm<Option<B>>
    where
        B: Send + 'static,
        F: Fn(&A) -> Option<B> + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells
                .iter()
                .find_map(|cell| journal.inspect(cell, |value| pf(value)))
        })
    }

    /// First element for which `pf` yields a transaction, and that
    /// transaction's result
    pub fn collect_first_stm<B, E, F>(&self, pf: F) -> Stm<Option<B>, E>
    where
        B: Send + 'static,
        E: Send + 'static,
        F: Fn(&A) -> Option<Stm<B, E>> + Send + Sync + 'static,
    {
        self.collect_first(pf)
            .lift()
            .and_then(|found| match found {
                Some(stm) => stm.map(Some),
                None => Stm::succeed_with(|| None),
            })
    }

    /// Apply `f` to every element
    pub fn transform<F>(&self, f: F) -> Stm<()>
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            for cell in cells {
                journal.modify(cell, |value| ((), f(value)));
            }
        })
    }

    /// Replace every element with the result of a transaction
    pub fn transform_stm<E, F>(&self, f: F) -> Stm<(), E>
    where
        E: Send + 'static,
        F: Fn(A) -> Stm<A, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Stm::for_each(self.cells.iter().cloned(), move |cell| {
            let f = Arc::clone(&f);
            let target = cell.clone();
            cell.get()
                .lift()
                .and_then(move |value| f(value))
                .and_then(move |next| target.set(next).lift())
        })
        .map(|_| ())
    }

    /// First element matching `predicate`
    pub fn find_first<P>(&self, predicate: P) -> Stm<Option<A>>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.collect_first(move |value| predicate(value).then(|| value.clone()))
    }

    /// Index of the first element matching `predicate`
    pub fn find_first_index<P>(&self, predicate: P) -> Stm<Option<usize>>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells
                .iter()
                .position(|cell| journal.inspect(cell, |value| predicate(value)))
        })
    }

    /// Last element matching `predicate`
    pub fn find_last<P>(&self, predicate: P) -> Stm<Option<A>>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells.iter().rev().find_map(|cell| {
                journal.inspect(cell, |value| predicate(value).then(|| value.clone()))
            })
        })
    }

    /// Index of the last element matching `predicate`
    pub fn find_last_index<P>(&self, predicate: P) -> Stm<Option<usize>>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells
                .iter()
                .rposition(|cell| journal.inspect(cell, |value| predicate(value)))
        })
    }

    /// Check if any element matches `predicate`
    pub fn exists<P>(&self, predicate: P) -> Stm<bool>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.find_first_index(predicate).map(|index| index.is_some())
    }

    /// Check if every element matches `predicate`
    pub fn every<P>(&self, predicate: P) -> Stm<bool>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.exists(move |value| !predicate(value)).map(|any| !any)
    }

    /// Number of elements matching `predicate`
    pub fn count<P>(&self, predicate: P) -> Stm<usize>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells
                .iter()
                .filter(|cell| journal.inspect(cell, |value| predicate(value)))
                .count()
        })
    }

    /// Fold the elements from the first to the last
    pub fn fold<B, F>(&self, zero: B, f: F) -> Stm<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(B, &A) -> B + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells.iter().fold(zero.clone(), |acc, cell| {
                journal.inspect(cell, |value| f(acc, value))
            })
        })
    }

    /// Combine the elements pairwise, or `None` for an empty array
    pub fn reduce_option<F>(&self, f: F) -> Stm<Option<A>>
    where
        F: Fn(&A, &A) -> A + Send + Sync + 'static,
    {
        self.scan(move |journal, cells| {
            cells.iter().fold(None, |acc: Option<A>, cell| {
                journal.inspect(cell, |value| match acc {
                    Some(acc) => Some(f(&acc, value)),
                    None => Some(value.clone()),
                })
            })
        })
    }

    /// First element, if any
    pub fn first_option(&self) -> Stm<Option<A>> {
        self.scan(|journal, cells| cells.first().map(|cell| journal.read(cell)))
    }

    /// Last element, if any
    pub fn last_option(&self) -> Stm<Option<A>> {
        self.scan(|journal, cells| cells.last().map(|cell| journal.read(cell)))
    }

    /// Read the array's cells in one journal step
    fn scan<B, F>(&self, f: F) -> Stm<B>
    where
        B: Send + 'static,
        F: Fn(&mut Journal, &[TRef<A>]) -> B + Send + Sync + 'static,
    {
        let cells = Arc::clone(&self.cells);
        Stm::with_journal(move |journal| Ok(f(journal, &cells)))
    }
}

impl<A: PartialEq + Clone + Send + Sync + 'static> TArray<A> {
    /// Check if some element equals `value`
    pub fn contains(&self, value: A) -> Stm<bool> {
        self.exists(move |a| *a == value)
    }

    /// Index of the first element equal to `value`
    pub fn index_of(&self, value: A) -> Stm<Option<usize>> {
        self.index_of_from(value, 0)
    }

    /// Index of the first element equal to `value` at or after `from`
    pub fn index_of_from(&self, value: A, from: usize) -> Stm<Option<usize>> {
        self.scan(move |journal, cells| {
            cells
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, cell)| journal.inspect(cell, |a| *a == value))
                .map(|(index, _)| index)
        })
    }

    /// Index of the last element equal to `value`
    pub fn last_index_of(&self, value: A) -> Stm<Option<usize>> {
        self.find_last_index(move |a| *a == value)
    }
}

impl<A: Ord + Clone + Send + Sync + 'static> TArray<A> {
    /// Largest element, or `None` for an empty array
    pub fn max_option(&self) -> Stm<Option<A>> {
        self.reduce_option(|a, b| if b > a { b.clone() } else { a.clone() })
    }

    /// Smallest element, or `None` for an empty array
    pub fn min_option(&self) -> Stm<Option<A>> {
        self.reduce_option(|a, b| if b < a { b.clone() } else { a.clone() })
    }
}
