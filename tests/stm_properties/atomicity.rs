//! Atomicity Tests
//!
//! - Increment races: every committed increment is counted exactly once
//! - Alternatives: a discarded branch leaves no trace in the commit
//! - Failures: a failed transaction publishes nothing

use crate::*;
use std::sync::Arc;
use tessel::{commit, CommitError, Stm, TRef};

// =============================================================================
// INCREMENT RACES
// =============================================================================

#[test]
fn test_two_threads_thousand_increments() {
    let counter = TRef::new(0u64);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                let increment = counter.update(|n| n + 1);
                for _ in 0..1000 {
                    commit(&increment).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(commit(&counter.get()).unwrap(), 2000);
}

#[test]
fn test_increment_race_counts_commits() {
    let manager = Arc::new(fresh_manager());
    let counter = TRef::new(0u64);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let counter = counter.clone();
            thread::spawn(move || {
                let increment = counter.update(|n| n + 1);
                for _ in 0..250 {
                    manager.commit(&increment).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(manager.commit(&counter.get()).unwrap(), 1000);

    let stats = manager.stats();
    assert_eq!(stats.commits, 1001);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.blocks, 0);
}

#[test]
fn test_read_modify_write_across_refs_is_isolated() {
    let a = TRef::new(0i32);
    let b = TRef::new(0i32);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                let (a2, b2) = (a.clone(), b.clone());
                let step = a.get().zip(b.get()).and_then(move |(x, y)| {
                    a2.set(x + 1).then(b2.set(y + 1)).map(move |_| (x, y))
                });
                for _ in 0..300 {
                    let (x, y) = commit(&step).unwrap();
                    assert_eq!(x, y, "a and b must move together");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(commit(&a.get().zip(b.get())).unwrap(), (900, 900));
}

// =============================================================================
// ALTERNATIVES
// =============================================================================

#[test]
fn test_or_else_discards_retried_branch_writes() {
    let left_only = TRef::new(0);
    let shared = TRef::new(0);

    let left = left_only
        .set(1)
        .then(shared.set(10))
        .then(Stm::<i32>::retry());
    let right = shared.update_and_get(|n| n + 5);

    assert_eq!(commit(&left.or_else(right)).unwrap(), 5);
    assert_eq!(commit(&left_only.get()).unwrap(), 0);
    assert_eq!(commit(&shared.get()).unwrap(), 5);
}

#[test]
fn test_or_else_discards_failed_branch_writes() {
    let r = TRef::new("initial");
    let left: Stm<&str, &str> = r.set("left").lift().then(Stm::fail("nope"));
    let right: Stm<&str, ()> = r.get().lift();

    assert_eq!(commit(&left.or_else(right)), Ok("initial"));
    assert_eq!(commit(&r.get()).unwrap(), "initial");
}

#[test]
fn test_nested_alternatives_keep_outer_writes() {
    let outer = TRef::new(0);
    let inner = TRef::new(0);

    let stm = outer
        .set(1)
        .then(inner.set(1).then(Stm::retry()).or_try(inner.set(2)))
        .then(outer.get().zip(inner.get()));

    assert_eq!(commit(&stm).unwrap(), (1, 2));
}

#[test]
fn test_catch_all_recovers_without_partial_writes() {
    let r = TRef::new(0);
    let failing: Stm<(), String> = r.set(99).lift().then(Stm::fail("bad".to_string()));
    let recovered: Stm<()> = failing.catch_all(|_| Stm::succeed(()));

    commit(&recovered).unwrap();
    assert_eq!(commit(&r.get()).unwrap(), 0);
}

// =============================================================================
// FAILURE
// =============================================================================

#[test]
fn test_failure_publishes_nothing() {
    let a = TRef::new(1);
    let b = TRef::new(2);
    let stm: Stm<(), &str> = a
        .set(10)
        .lift()
        .then(b.set(20).lift())
        .then(Stm::fail("abort"));

    assert_eq!(commit(&stm), Err("abort"));
    assert_eq!(commit(&a.get().zip(b.get())).unwrap(), (1, 2));
}

#[test]
fn test_interruptible_failure_is_typed() {
    let manager = fresh_manager();
    let stm: Stm<(), u8> = Stm::fail(7);
    assert_eq!(
        manager.commit_interruptible(&stm, &tessel::Interrupt::new()),
        Err(CommitError::Failed(7))
    );
}
