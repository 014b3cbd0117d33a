//! Interruption Tests
//!
//! An interrupted waiter must have removed every wakeup it registered by
//! the time the interruption completes, and must have committed nothing.

use crate::*;
use std::sync::Arc;
use tessel::{CommitError, Interrupt, Stm, TQueue, TRef};

#[test]
fn test_interrupted_taker_leaves_no_wakeups() {
    let manager = Arc::new(fresh_manager());
    let queue = TQueue::<u32>::bounded(4);
    let interrupt = Interrupt::new();

    let taker = {
        let manager = Arc::clone(&manager);
        let queue = queue.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || manager.commit_interruptible(&queue.take(), &interrupt))
    };

    wait_until(|| queue.waiter_count(), 2);
    interrupt.interrupt();

    assert_eq!(taker.join().unwrap(), Err(CommitError::Interrupted));
    assert_eq!(queue.waiter_count(), 0);
}

#[test]
fn test_interrupted_waiter_commits_nothing() {
    let manager = Arc::new(fresh_manager());
    let marker = TRef::new(0);
    let gate = TRef::new(false);
    let interrupt = Interrupt::new();

    let waiter = {
        let manager = Arc::clone(&manager);
        let (marker, gate) = (marker.clone(), gate.clone());
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            let stm = marker
                .set(1)
                .then(gate.get())
                .and_then(Stm::check);
            manager.commit_interruptible(&stm, &interrupt)
        })
    };

    wait_until(|| gate.waiter_count(), 1);
    interrupt.interrupt();

    assert!(waiter.join().unwrap().unwrap_err().is_interrupted());
    assert_eq!(tessel::commit(&marker.get()).unwrap(), 0);
    assert_eq!(gate.waiter_count() + marker.waiter_count(), 0);
}

#[test]
fn test_one_token_interrupts_many_waiters() {
    let manager = Arc::new(fresh_manager());
    let gate = TRef::new(0u8);
    let interrupt = Interrupt::new();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let gate = gate.clone();
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                let stm = gate.get().and_then(|v| Stm::check(v == 9));
                manager.commit_interruptible(&stm, &interrupt)
            })
        })
        .collect();

    wait_until(|| gate.waiter_count(), 3);
    interrupt.interrupt();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Err(CommitError::Interrupted));
    }
    assert_eq!(gate.waiter_count(), 0);
}

#[test]
fn test_wakeup_before_interrupt_still_commits() {
    let manager = Arc::new(fresh_manager());
    let gate = TRef::new(false);
    let interrupt = Interrupt::new();

    let waiter = {
        let manager = Arc::clone(&manager);
        let gate = gate.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            manager.commit_interruptible(&gate.get().and_then(Stm::check), &interrupt)
        })
    };

    wait_until(|| gate.waiter_count(), 1);
    tessel::commit(&gate.set(true)).unwrap();

    assert_eq!(waiter.join().unwrap(), Ok(()));
    assert!(!interrupt.is_interrupted());
}
