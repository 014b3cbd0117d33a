//! Structure Tests
//!
//! Cross-structure behavior under concurrency:
//! - TArray scans see one consistent point in time
//! - TQueue boundaries and transfers between queues
//! - TSemaphore bounding concurrent work

use crate::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tessel::{commit, ArrayError, Error, QueueError, Stm, TArray, TQueue, TSemaphore};

// =============================================================================
// TARRAY
// =============================================================================

#[test]
fn test_array_scan_is_atomic() {
    let array = TArray::new(vec![0u64; 16]);
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let array = array.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for _ in 0..300 {
                commit(&array.transform(|n| n + 1)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let array = array.clone();
        thread::spawn(move || {
            let scan = array.to_vec();
            let mut scans = 0;
            while !done.load(Ordering::SeqCst) {
                let values = commit(&scan).unwrap();
                assert!(
                    values.windows(2).all(|w| w[0] == w[1]),
                    "torn scan: {values:?}"
                );
                scans += 1;
            }
            scans
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(commit(&array.to_vec()).unwrap(), vec![300; 16]);
}

#[test]
fn test_array_collect_first_sees_one_snapshot() {
    let array = TArray::new(vec![0u64; 16]);
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let array = array.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for _ in 0..300 {
                commit(&array.transform(|n| n + 1)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let array = array.clone();
        thread::spawn(move || {
            let scanned = array.clone();
            let mismatch = array.get(0).map_err(Error::from).and_then(move |first| {
                scanned
                    .collect_first(move |n| (*n != first).then_some((first, *n)))
                    .lift::<Error>()
            });
            while !done.load(Ordering::SeqCst) {
                assert_eq!(commit(&mismatch).unwrap(), None);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_array_errors_lift_into_unified_error() {
    let array = TArray::new(vec![1, 2, 3]);
    let queue = TQueue::bounded(2);

    let target = queue.clone();
    let stm: Stm<bool, Error> = array
        .get(5)
        .map_err(Error::from)
        .and_then(move |n| target.offer(n).map_err(Error::from));

    assert_eq!(
        commit(&stm),
        Err(Error::Array(ArrayError::IndexOutOfBounds { index: 5, len: 3 }))
    );
    assert_eq!(commit(&queue.size()).unwrap(), 0);

    let doubled = array.update_stm(0, |n| Stm::<i32, Error>::succeed(n * 2));
    commit(&doubled).unwrap();
    assert_eq!(commit(&array.get(0)).unwrap(), 2);
}

// =============================================================================
// TQUEUE
// =============================================================================

#[test]
fn test_queue_take_up_to_boundaries() {
    let queue = TQueue::bounded(5);
    for n in 1..=5 {
        assert!(commit(&queue.offer(n)).unwrap());
    }
    assert!(commit(&queue.is_full()).unwrap());

    assert_eq!(commit(&queue.take_up_to(3)).unwrap(), vec![1, 2, 3]);
    assert_eq!(commit(&queue.take_up_to(7)).unwrap(), vec![4, 5]);
    assert!(commit(&queue.is_empty()).unwrap());
}

#[test]
fn test_queue_boundaries_after_wraparound() {
    let queue = TQueue::bounded(5);
    commit(&queue.offer_all(vec![0, 0, 0])).unwrap();
    commit(&queue.take_all()).unwrap();

    // the ring now starts mid-array, so the full queue spans the wrap
    commit(&queue.offer_all(vec![1, 2, 3, 4, 5])).unwrap();
    assert!(commit(&queue.is_full()).unwrap());
    let blocked = queue.offer(6).or_try(Stm::succeed(false));
    assert!(!commit(&blocked).unwrap());

    assert_eq!(commit(&queue.take_up_to(3)).unwrap(), vec![1, 2, 3]);
    assert_eq!(commit(&queue.take_up_to(7)).unwrap(), vec![4, 5]);
}

#[test]
fn test_queue_transfer_is_atomic() {
    let inbox = TQueue::bounded(64);
    let outbox = TQueue::unbounded();
    commit(&inbox.offer_all((0..64).collect())).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (inbox, outbox) = (inbox.clone(), outbox.clone());
            thread::spawn(move || {
                let target = outbox.clone();
                let step = inbox.poll().and_then(move |item| match item {
                    Some(n) => target.offer(n).map(|_| true),
                    None => Stm::succeed(false),
                });
                while commit(&step).unwrap() {}
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut moved = commit(&outbox.take_all()).unwrap();
    moved.sort_unstable();
    assert_eq!(moved, (0..64).collect::<Vec<_>>());
    assert_eq!(commit(&inbox.size()).unwrap(), 0);
}

#[test]
fn test_shutdown_wakes_blocked_taker() {
    let queue = TQueue::<u8>::bounded(2);

    let taker = {
        let queue = queue.clone();
        thread::spawn(move || commit(&queue.take()))
    };

    wait_until(|| queue.waiter_count(), 2);
    commit(&queue.shutdown()).unwrap();

    assert_eq!(taker.join().unwrap(), Err(QueueError::Shutdown));
    assert_eq!(queue.waiter_count(), 0);
}

#[test]
fn test_await_shutdown_blocks_until_shutdown() {
    let queue = TQueue::<u8>::unbounded();

    let watcher = {
        let queue = queue.clone();
        thread::spawn(move || commit(&queue.await_shutdown()))
    };

    wait_until(|| queue.waiter_count(), 1);
    commit(&queue.shutdown()).unwrap();
    assert_eq!(watcher.join().unwrap(), Ok(()));
}

// =============================================================================
// TSEMAPHORE
// =============================================================================

#[test]
fn test_semaphore_bounds_concurrency() {
    let semaphore = TSemaphore::new(3);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let semaphore = semaphore.clone();
            let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
            thread::spawn(move || {
                for _ in 0..5 {
                    semaphore.with_permits(1, || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(commit(&semaphore.available()).unwrap(), 3);
}

#[test]
fn test_semaphore_composes_with_queue() {
    let semaphore = TSemaphore::new(1);
    let queue = TQueue::bounded(4);

    let (sem, target) = (semaphore.clone(), queue.clone());
    let guarded = sem
        .acquire()
        .lift()
        .then(target.offer("work"))
        .and_then(move |_| sem.release().lift());

    commit(&guarded).unwrap();
    assert_eq!(commit(&semaphore.available()).unwrap(), 1);
    assert_eq!(commit(&queue.take()).unwrap(), "work");
}
