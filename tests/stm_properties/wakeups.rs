//! Wakeup Tests
//!
//! A transaction blocked in retry must resume once a ref it read changes,
//! and must leave no wakeup registered after it completes.

use crate::*;
use tessel::{commit, Stm, TQueue, TRef};

#[test]
fn test_single_slot_queue_loses_no_wakeups() {
    init_tracing();
    let queue = TQueue::bounded(1);
    const ITEMS: u32 = 1000;

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for n in 0..ITEMS {
                commit(&queue.offer(n)).unwrap();
            }
        })
    };
    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let take = queue.take();
            (0..ITEMS)
                .map(|_| commit(&take).unwrap())
                .collect::<Vec<_>>()
        })
    };

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
    assert_eq!(queue.waiter_count(), 0);
}

#[test]
fn test_every_waiter_wakes() {
    let gate = TRef::new(false);

    let waiters: Vec<_> = (0..4)
        .map(|id| {
            let gate = gate.clone();
            thread::spawn(move || {
                commit(&gate.get().and_then(Stm::check).map(move |_| id)).unwrap()
            })
        })
        .collect();

    wait_until(|| gate.waiter_count(), 4);
    commit(&gate.set(true)).unwrap();

    let mut ids: Vec<_> = waiters.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(gate.waiter_count(), 0);
}

#[test]
fn test_unrelated_change_blocks_again() {
    let level = TRef::new(0);

    let waiter = {
        let level = level.clone();
        thread::spawn(move || {
            commit(&level.get().and_then(|n| Stm::check(n >= 3).map(move |_| n))).unwrap()
        })
    };

    for n in 1..=3 {
        wait_until(|| level.waiter_count(), 1);
        commit(&level.set(n)).unwrap();
    }

    assert_eq!(waiter.join().unwrap(), 3);
    assert_eq!(level.waiter_count(), 0);
}

#[test]
fn test_waiter_watches_every_ref_it_read() {
    let a = TRef::new(0);
    let b = TRef::new(0);

    let waiter = {
        let (a, b) = (a.clone(), b.clone());
        thread::spawn(move || {
            let sum = a.get().zip_with(b.get(), |x, y| x + y);
            commit(&sum.and_then(|s| Stm::check(s > 0).map(move |_| s))).unwrap()
        })
    };

    wait_until(|| a.waiter_count() + b.waiter_count(), 2);
    commit(&b.set(4)).unwrap();

    assert_eq!(waiter.join().unwrap(), 4);
    assert_eq!(a.waiter_count(), 0);
    assert_eq!(b.waiter_count(), 0);
}

#[test]
fn test_blocked_statistics() {
    let manager = std::sync::Arc::new(fresh_manager());
    let flag = TRef::new(false);

    let waiter = {
        let manager = std::sync::Arc::clone(&manager);
        let flag = flag.clone();
        thread::spawn(move || manager.commit(&flag.get().and_then(Stm::check)))
    };

    wait_until(|| flag.waiter_count(), 1);
    commit(&flag.set(true)).unwrap();
    waiter.join().unwrap().unwrap();

    let stats = manager.stats();
    assert!(stats.blocks >= 1);
    assert_eq!(stats.commits, 1);
}
