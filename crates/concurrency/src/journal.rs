//! Per-attempt journal of touched cells
//!
//! A [`Journal`] maps every [`RefId`] an attempt touched to an [`Entry`]
//! holding the version observed at first touch and the tentative value.
//! Journals live for exactly one evaluation attempt and are never shared.
//!
//! ## Invariants
//!
//! - At most one entry per ref
//! - An entry's `expected_version` never changes after first touch, so all
//!   reads of one ref within an attempt are against the same version
//! - Entries never write to the committed cell; only commit publishes them
//!
//! ## Nested alternatives
//!
//! `or_else`, `or_try`, `catch_all` and `either` open a checkpoint before
//! running their left branch. While any checkpoint is open, every write and
//! every first touch is recorded in an undo log, so a branch that retries or
//! fails can be rolled back: tentative values return to their state at the
//! checkpoint, refs allocated inside the branch are forgotten, and reads made
//! by the branch stay in the journal (they still matter for validation and
//! for wakeups if the whole transaction ends up blocking).

use crate::tref::{TRef, Todo, Watch};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::Any;
use std::mem;
use std::sync::Arc;
use tessel_core::RefId;

/// Bookkeeping for one touched cell
pub(crate) struct Entry<A> {
    tref: TRef<A>,
    expected_version: u64,
    tentative: A,
    is_new: bool,
    changed: bool,
}

impl<A: Clone + Send + Sync + 'static> Entry<A> {
    /// Snapshot the committed state of `tref`
    fn snapshot(tref: TRef<A>) -> Self {
        let live = tref.cell().snapshot();
        Entry {
            tref,
            expected_version: live.version,
            tentative: live.value,
            is_new: false,
            changed: false,
        }
    }

    /// Entry for a ref allocated by the current attempt
    fn fresh(tref: TRef<A>, value: A) -> Self {
        let expected_version = tref.cell().snapshot().version;
        Entry {
            tref,
            expected_version,
            tentative: value,
            is_new: true,
            changed: false,
        }
    }

    pub(crate) fn get(&self) -> &A {
        &self.tentative
    }

    /// Replace the tentative value, returning the previous one
    pub(crate) fn set(&mut self, value: A) -> A {
        self.changed = true;
        mem::replace(&mut self.tentative, value)
    }

    /// Whether this entry may commit against `live_version`
    pub(crate) fn is_valid(&self, live_version: u64) -> bool {
        self.is_new || self.expected_version == live_version
    }
}

/// Type-erased entry operations needed by validation, commit and rollback
pub(crate) trait JournalEntry {
    fn id(&self) -> RefId;
    fn is_new(&self) -> bool;
    fn is_changed(&self) -> bool;
    fn is_valid_now(&self) -> bool;
    fn watch(&self) -> Arc<dyn Watch>;
    fn publish(self: Box<Self>) -> Vec<Todo>;
    fn restore(&mut self, previous: Box<dyn Any + Send>, changed: bool);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<A: Clone + Send + Sync + 'static> JournalEntry for Entry<A> {
    fn id(&self) -> RefId {
        self.tref.id()
    }

    fn is_new(&self) -> bool {
        self.is_new
    }

    fn is_changed(&self) -> bool {
        self.changed
    }

    fn is_valid_now(&self) -> bool {
        self.is_valid(self.tref.cell().version())
    }

    fn watch(&self) -> Arc<dyn Watch> {
        self.tref.cell().clone()
    }

    fn publish(self: Box<Self>) -> Vec<Todo> {
        let entry = *self;
        entry
            .tref
            .cell()
            .publish(entry.tentative, entry.expected_version)
    }

    fn restore(&mut self, previous: Box<dyn Any + Send>, changed: bool) {
        if let Ok(previous) = previous.downcast::<A>() {
            self.tentative = *previous;
            self.changed = changed;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

enum Undo {
    /// First touch of a ref
    Touched(RefId),
    /// Tentative value before a write
    Written {
        id: RefId,
        previous: Box<dyn Any + Send>,
        changed: bool,
    },
}

/// Position in the undo log returned by [`Journal::checkpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint(usize);

/// Per-attempt map from cell handle to entry
///
/// Handed to [`Stm::with_journal`](crate::Stm::with_journal) closures, which
/// is how every transactional operation in this workspace is built.
#[derive(Default)]
pub struct Journal {
    entries: FxHashMap<RefId, Box<dyn JournalEntry>>,
    undo: Vec<Undo>,
    depth: usize,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refs touched so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no ref has been touched
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if `tref` has been touched by this attempt
    pub fn contains<A>(&self, tref: &TRef<A>) -> bool {
        self.entries.contains_key(&tref.id())
    }

    /// Entry for `tref`, snapshotting the committed state on first touch
    pub(crate) fn get_or_create_entry<A>(&mut self, tref: &TRef<A>) -> &mut Entry<A>
    where
        A: Clone + Send + Sync + 'static,
    {
        let id = tref.id();
        if !self.entries.contains_key(&id) {
            self.entries
                .insert(id, Box::new(Entry::snapshot(tref.clone())));
            if self.depth > 0 {
                self.undo.push(Undo::Touched(id));
            }
        }
        match self
            .entries
            .get_mut(&id)
            .and_then(|entry| entry.as_any_mut().downcast_mut::<Entry<A>>())
        {
            Some(entry) => entry,
            None => unreachable!("{} is bound to a different value type", id),
        }
    }

    /// Allocate a ref whose only entry lives in this journal
    pub fn new_ref<A>(&mut self, value: A) -> TRef<A>
    where
        A: Clone + Send + Sync + 'static,
    {
        let tref = TRef::new(value.clone());
        let id = tref.id();
        self.entries
            .insert(id, Box::new(Entry::fresh(tref.clone(), value)));
        if self.depth > 0 {
            self.undo.push(Undo::Touched(id));
        }
        tref
    }

    /// Tentative value of `tref`
    pub fn read<A>(&mut self, tref: &TRef<A>) -> A
    where
        A: Clone + Send + Sync + 'static,
    {
        self.get_or_create_entry(tref).get().clone()
    }

    /// Inspect the tentative value of `tref` without cloning it
    pub fn inspect<A, R>(&mut self, tref: &TRef<A>, f: impl FnOnce(&A) -> R) -> R
    where
        A: Clone + Send + Sync + 'static,
    {
        f(self.get_or_create_entry(tref).get())
    }

    /// Replace the tentative value of `tref`
    pub fn write<A>(&mut self, tref: &TRef<A>, value: A)
    where
        A: Clone + Send + Sync + 'static,
    {
        let entry = self.get_or_create_entry(tref);
        let changed = entry.changed;
        let previous = entry.set(value);
        self.record_write(tref.id(), previous, changed);
    }

    /// Apply `f` to the tentative value, store its second result and return
    /// the first
    pub fn modify<A, B>(&mut self, tref: &TRef<A>, f: impl FnOnce(&A) -> (B, A)) -> B
    where
        A: Clone + Send + Sync + 'static,
    {
        let (out, next) = f(self.get_or_create_entry(tref).get());
        self.write(tref, next);
        out
    }

    /// Mutate the tentative value in place
    ///
    /// Cheaper than [`Journal::modify`] for large values; the previous value
    /// is only cloned while a checkpoint is open.
    pub fn mutate<A, R>(&mut self, tref: &TRef<A>, f: impl FnOnce(&mut A) -> R) -> R
    where
        A: Clone + Send + Sync + 'static,
    {
        let recording = self.depth > 0;
        let entry = self.get_or_create_entry(tref);
        let changed = entry.changed;
        let previous = recording.then(|| entry.tentative.clone());
        entry.changed = true;
        let out = f(&mut entry.tentative);
        if let Some(previous) = previous {
            self.record_write(tref.id(), previous, changed);
        }
        out
    }

    fn record_write<A: Send + 'static>(&mut self, id: RefId, previous: A, changed: bool) {
        if self.depth > 0 {
            self.undo.push(Undo::Written {
                id,
                previous: Box::new(previous),
                changed,
            });
        }
    }

    /// Check every entry against the live version of its cell
    pub fn is_valid(&self) -> bool {
        self.entries.values().all(|entry| entry.is_valid_now())
    }

    /// Check if any entry carries a write
    pub fn has_changes(&self) -> bool {
        self.entries.values().any(|entry| entry.is_changed())
    }

    pub(crate) fn ids(&self) -> SmallVec<[RefId; 8]> {
        self.entries.keys().copied().collect()
    }

    /// Cells a blocked attempt must watch; refs it allocated itself are
    /// skipped since no one else can change them
    pub(crate) fn watches(&self) -> Vec<Arc<dyn Watch>> {
        self.entries
            .values()
            .filter(|entry| !entry.is_new())
            .map(|entry| entry.watch())
            .collect()
    }

    /// Write every changed entry to its cell and collect the todos to run
    ///
    /// Caller must hold the commit stripes of every entry and have
    /// validated the journal under them.
    pub(crate) fn publish(self) -> Vec<Todo> {
        let mut todos = Vec::new();
        for (_, entry) in self.entries {
            if entry.is_changed() {
                todos.extend(entry.publish());
            }
        }
        todos
    }

    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint(self.undo.len())
    }

    /// Keep everything done since `checkpoint`
    pub(crate) fn release(&mut self, checkpoint: Checkpoint) {
        debug_assert!(self.depth > 0 && self.undo.len() >= checkpoint.0);
        self.depth -= 1;
        if self.depth == 0 {
            self.undo.clear();
        }
    }

    /// Undo every write and forget every ref allocated since `checkpoint`
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        debug_assert!(self.depth > 0);
        while self.undo.len() > checkpoint.0 {
            match self.undo.pop() {
                Some(Undo::Written {
                    id,
                    previous,
                    changed,
                }) => {
                    if let Some(entry) = self.entries.get_mut(&id) {
                        entry.restore(previous, changed);
                    }
                }
                Some(Undo::Touched(id)) => {
                    if self.entries.get(&id).is_some_and(|entry| entry.is_new()) {
                        self.entries.remove(&id);
                    }
                }
                None => break,
            }
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.undo.clear();
        }
    }
}
