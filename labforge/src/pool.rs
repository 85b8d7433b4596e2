//! Fixed-size worker fan-out over a [`WorkQueue`].
//!
//! The pool spawns an operator-chosen number of workers (never sized from
//! the queue), each looping pop → action → done until the queue drains, and
//! blocks the caller until every worker has exited. All business state lives
//! in the action and its shared context; the pool itself only moves items.
//!
//! Actions are expected to handle their own failures; a worker does not
//! inspect the action's outcome, it just moves to the next item. An action
//! may push new items onto the queue (the error-recovery path does), and the
//! drain condition accounts for that: workers only stop once the queue is
//! empty *and* no popped item is still being processed.

use crate::queue::WorkQueue;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// How long a worker waits on an empty queue before re-checking whether
/// draining has finished. Matches the pacing of the status-poll loops.
pub const DEFAULT_POP_WAIT: Duration = Duration::from_secs(5);

/// Pause between consecutive worker startups, so a full pool does not land
/// its first burst of provider calls in the same instant.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);

/// Fixed-concurrency executor for one work queue.
///
/// # Example
///
/// ```ignore
/// use labforge::{pool::WorkerPool, queue::WorkQueue};
///
/// let queue = WorkQueue::new(jobs);
/// WorkerPool::new(10)
///     .run(queue.clone(), context, |job, ctx| async move {
///         build_node(job, ctx).await;
///     })
///     .await;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
    pop_wait: Duration,
    stagger: Duration,
}

impl WorkerPool {
    /// Creates a pool that will run `concurrency` workers. A concurrency of
    /// zero is clamped to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            pop_wait: DEFAULT_POP_WAIT,
            stagger: DEFAULT_STAGGER,
        }
    }

    /// Overrides the empty-queue wait between drain checks.
    pub fn with_pop_wait(mut self, pop_wait: Duration) -> Self {
        self.pop_wait = pop_wait;
        self
    }

    /// Overrides the startup stagger between workers.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Number of workers this pool runs.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Drains `queue` through `action`, `concurrency` workers at a time,
    /// and returns once every worker has exited.
    ///
    /// Each queue item is handed to `action` exactly once along with a
    /// clone of `context`. Completion order across workers is unspecified.
    pub async fn run<T, C, F, Fut>(&self, queue: WorkQueue<T>, context: C, action: F)
    where
        T: Send + 'static,
        C: Clone + Send + 'static,
        F: Fn(T, C) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut workers = Vec::with_capacity(self.concurrency);
        for index in 0..self.concurrency {
            let queue = queue.clone();
            let context = context.clone();
            let action = action.clone();
            let pop_wait = self.pop_wait;
            let startup_delay = self.stagger * index as u32;

            workers.push(tokio::spawn(async move {
                if !startup_delay.is_zero() {
                    tokio::time::sleep(startup_delay).await;
                }
                debug!(worker = index, "worker started");
                loop {
                    match queue.pop(pop_wait).await {
                        Some(item) => {
                            action(item, context.clone()).await;
                            queue.task_done().await;
                        }
                        None => {
                            if queue.is_drained().await {
                                break;
                            }
                        }
                    }
                }
                debug!(worker = index, "worker finished");
            }));
        }

        for worker in workers {
            if let Err(join_error) = worker.await {
                error!(error = %join_error, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick_pool(concurrency: usize) -> WorkerPool {
        WorkerPool::new(concurrency)
            .with_pop_wait(Duration::from_millis(10))
            .with_stagger(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_empty_queue_returns_immediately() {
        let queue: WorkQueue<u32> = WorkQueue::new([]);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        quick_pool(4)
            .run(queue, counter, |_, counter| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_worker_processes_every_item() {
        let queue = WorkQueue::new(0..5u32);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        quick_pool(1)
            .run(queue, counter, |_, counter| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_pool_larger_than_queue_still_drains_cleanly() {
        let queue = WorkQueue::new([1u32, 2]);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        quick_pool(8)
            .run(queue, counter, |_, counter| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_item_requeued_by_action_is_processed_too() {
        let queue = WorkQueue::new([0u32]);
        let hits = Arc::new(AtomicUsize::new(0));
        let context = (queue.clone(), Arc::clone(&hits));

        quick_pool(2)
            .run(queue, context, |item, (queue, counter)| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if item == 0 {
                    queue.push(item + 1).await;
                }
            })
            .await;

        // The seeded item plus the one its action pushed back.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
