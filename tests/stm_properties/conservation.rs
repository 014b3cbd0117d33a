//! Conservation Tests
//!
//! Random transfers between accounts run from many threads while readers
//! sum every account in one transaction. No reader may ever observe a
//! total other than the initial one.

use crate::*;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessel::{commit, Stm, TArray, TRef};

const ACCOUNTS: usize = 8;
const INITIAL: i64 = 1_000;

fn transfer(accounts: &[TRef<i64>], from: usize, to: usize, amount: i64) -> Stm<bool> {
    let (source, target) = (accounts[from].clone(), accounts[to].clone());
    source.get().and_then(move |balance| {
        if balance < amount {
            return Stm::succeed(false);
        }
        source
            .update(move |b| b - amount)
            .then(target.update(move |b| b + amount))
            .map(|_| true)
    })
}

fn total(accounts: &[TRef<i64>]) -> Stm<i64> {
    Stm::collect_all(accounts.iter().map(TRef::get)).map(|balances| balances.iter().sum())
}

#[test]
fn test_transfers_conserve_total() {
    init_tracing();
    let accounts: Arc<Vec<TRef<i64>>> =
        Arc::new((0..ACCOUNTS).map(|_| TRef::new(INITIAL)).collect());
    let expected = INITIAL * ACCOUNTS as i64;
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let accounts = Arc::clone(&accounts);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let snapshot = total(&accounts);
            let mut observed = 0;
            while !done.load(Ordering::SeqCst) {
                assert_eq!(commit(&snapshot).unwrap(), expected);
                observed += 1;
            }
            observed
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let accounts = Arc::clone(&accounts);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..500 {
                    let from = rng.gen_range(0..ACCOUNTS);
                    let to = rng.gen_range(0..ACCOUNTS);
                    let amount = rng.gen_range(1..200);
                    commit(&transfer(&accounts, from, to, amount)).unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.join().unwrap() > 0);
    assert_eq!(commit(&total(&accounts)).unwrap(), expected);
}

#[test]
fn test_no_balance_goes_negative() {
    let accounts: Arc<Vec<TRef<i64>>> = Arc::new(vec![TRef::new(50), TRef::new(0)]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let accounts = Arc::clone(&accounts);
            thread::spawn(move || {
                (0..100)
                    .filter(|_| commit(&transfer(&accounts, 0, 1, 1)).unwrap())
                    .count()
            })
        })
        .collect();

    let moved: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(moved, 50);
    assert_eq!(commit(&accounts[0].get()).unwrap(), 0);
    assert_eq!(commit(&accounts[1].get()).unwrap(), 50);
}

#[test]
fn test_array_transfers_conserve_total() {
    let array = TArray::new(vec![INITIAL; ACCOUNTS]);
    let expected = INITIAL * ACCOUNTS as i64;

    let handles: Vec<_> = (0..4)
        .map(|seed| {
            let array = array.clone();
            thread::spawn(move || {
                for step in 0..300 {
                    let from = (seed + step) % ACCOUNTS;
                    let to = (seed * 3 + step * 7 + 1) % ACCOUNTS;
                    let target = array.clone();
                    let stm = array
                        .update(from, |b| b - 5)
                        .then(target.update(to, |b| b + 5));
                    commit(&stm).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(commit(&array.fold(0, |acc, b| acc + b)).unwrap(), expected);
}
