//! Integration tests for the worker pool and work queue.
//!
//! These tests verify the fan-out workflow the build engine relies on:
//! - Every queued item is handed to exactly one worker
//! - Concurrency stays within the pool size
//! - Items pushed while the pool is running are drained too
//! - Actions that retry internally do not stall the drain

use labforge::pool::WorkerPool;
use labforge::queue::WorkQueue;
use labforge::retry::{Attempt, RetryError, RetryPolicy};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

/// Pool tuned for tests: short pop wait, no startup stagger.
fn quick_pool(workers: usize) -> WorkerPool {
    WorkerPool::new(workers)
        .with_pop_wait(Duration::from_millis(25))
        .with_stagger(Duration::ZERO)
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_item_is_processed_exactly_once() {
    let queue = WorkQueue::new(0..100u32);
    let handle = queue.clone();
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let invocations = Arc::new(AtomicUsize::new(0));

    let context = (Arc::clone(&seen), Arc::clone(&invocations));
    quick_pool(7)
        .run(queue, context, |item, context| async move {
            let (seen, invocations) = context;
            invocations.fetch_add(1, Ordering::SeqCst);
            seen.lock().unwrap().insert(item);
        })
        .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 100);
    assert_eq!(seen.lock().unwrap().len(), 100);
    assert!(handle.is_drained().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_count_caps_concurrent_actions() {
    let queue = WorkQueue::new(0..40u32);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let context = (Arc::clone(&in_flight), Arc::clone(&peak));
    quick_pool(4)
        .run(queue, context, |_item, context| async move {
            let (in_flight, peak) = context;
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "observed {peak} concurrent actions from a pool of 4");
    assert!(peak >= 2, "pool of 4 never overlapped any work");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_items_pushed_mid_run_drain_before_the_pool_returns() {
    let queue = WorkQueue::new(0..10u32);
    let seen = Arc::new(Mutex::new(HashSet::new()));

    let context = (queue.clone(), Arc::clone(&seen));
    quick_pool(3)
        .run(queue, context, |item, context| async move {
            let (queue, seen) = context;
            seen.lock().unwrap().insert(item);
            // The first few items spawn follow-up work, the way a failed
            // node re-enters the queue during a build.
            if item < 3 {
                queue.push(item + 100).await;
            }
        })
        .await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 13);
    for follow_up in [100, 101, 102] {
        assert!(seen.contains(&follow_up), "follow-up {follow_up} was dropped");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actions_that_retry_internally_still_drain_the_queue() {
    let queue = WorkQueue::new(0..12u32);
    let settled = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));

    let context = (Arc::clone(&settled), Arc::clone(&attempts));
    quick_pool(3)
        .run(queue, context, |_item, context| async move {
            let (settled, attempts) = context;
            let tally = &attempts;
            let outcome: Result<u32, RetryError<String>> = RetryPolicy::new(5)
                .run(|attempt| async move {
                    tally.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Attempt::Retry
                    } else {
                        Attempt::Done(attempt)
                    }
                })
                .await;
            if outcome.is_ok() {
                settled.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    assert_eq!(settled.load(Ordering::SeqCst), 12);
    // Two failed attempts and one success per item.
    assert_eq!(attempts.load(Ordering::SeqCst), 36);
}
