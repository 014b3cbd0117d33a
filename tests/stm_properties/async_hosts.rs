//! Async Host Tests
//!
//! The commit protocol driven from tokio tasks. Dropping a blocked commit
//! future is the interruption path.

use crate::*;
use std::time::Duration;
use tessel::{commit_async, TQueue, TRef, TSemaphore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_producer_consumer() {
    init_tracing();
    let queue = TQueue::bounded(2);

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for n in 0..200u32 {
                commit_async(&queue.offer(n)).await.unwrap();
            }
        })
    };
    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut sum = 0u32;
            for _ in 0..200 {
                sum += commit_async(&queue.take()).await.unwrap();
            }
            sum
        })
    };

    producer.await.unwrap();
    assert_eq!(consumer.await.unwrap(), (0..200).sum::<u32>());
    assert_eq!(queue.waiter_count(), 0);
}

#[tokio::test]
async fn test_dropped_future_removes_wakeups() {
    let queue = TQueue::<u8>::unbounded();
    let take = queue.take();

    let result = tokio::time::timeout(Duration::from_millis(20), commit_async(&take)).await;
    assert!(result.is_err());
    assert_eq!(queue.waiter_count(), 0);

    commit_async(&queue.offer(1)).await.unwrap();
    assert_eq!(commit_async(&queue.poll()).await.unwrap(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_semaphore_handoff() {
    let semaphore = TSemaphore::new(0);
    let done = TRef::new(false);

    let waiter = {
        let (semaphore, done) = (semaphore.clone(), done.clone());
        tokio::spawn(async move {
            commit_async(&semaphore.acquire_n(2)).await.unwrap();
            commit_async(&done.set(true)).await.unwrap();
        })
    };

    commit_async(&semaphore.release()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!commit_async(&done.get()).await.unwrap());

    commit_async(&semaphore.release()).await.unwrap();
    waiter.await.unwrap();
    assert!(commit_async(&done.get()).await.unwrap());
    assert_eq!(commit_async(&semaphore.available()).await.unwrap(), 0);
}
