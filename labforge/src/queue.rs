//! Shared FIFO work queue for the build worker pool.
//!
//! The queue is loaded once up front with one job per node, then drained by
//! a fixed set of workers. Two things make it more than a plain deque:
//!
//! - **Timeout-sentinel pop.** [`WorkQueue::pop`] waits up to a timeout and
//!   returns `None` when nothing arrived, so workers can periodically
//!   re-check the drain condition instead of exiting the moment the deque
//!   looks empty. That matters because the error-recovery path pushes jobs
//!   back while other workers are still draining.
//! - **In-flight accounting.** A popped item counts as in flight until the
//!   worker calls [`WorkQueue::task_done`]. The queue is only
//!   [drained](WorkQueue::is_drained) when the deque is empty *and* nothing
//!   is in flight, because an in-flight job may still requeue itself.
//!
//! Handles are cheap clones sharing one queue. FIFO order is guaranteed for
//! dequeue; completion order across workers is not.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Concurrent FIFO of pending work items.
pub struct WorkQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

struct QueueState<T> {
    ready: VecDeque<T>,
    in_flight: usize,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Creates a queue pre-loaded with `items`, in order.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    ready: items.into_iter().collect(),
                    in_flight: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Appends an item. Used by workers requeuing failed jobs while the
    /// rest of the pool is still draining.
    pub async fn push(&self, item: T) {
        let mut state = self.inner.state.lock().await;
        state.ready.push_back(item);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Removes and returns the next item, waiting up to `timeout` for one
    /// to arrive. Returns `None` once the timeout elapses with the queue
    /// empty; callers should then consult [`is_drained`](Self::is_drained)
    /// before deciding to stop.
    ///
    /// A returned item is counted as in flight until
    /// [`task_done`](Self::task_done) is called.
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.inner.state.lock().await;
                if let Some(item) = state.ready.pop_front() {
                    state.in_flight += 1;
                    return Some(item);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            // A push between the check above and this registration leaves a
            // stored permit, so the wait completes immediately.
            let _ = tokio::time::timeout(remaining, self.inner.notify.notified()).await;
        }
    }

    /// Marks one previously popped item as finished.
    pub async fn task_done(&self) {
        let mut state = self.inner.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        // Wake waiting workers so they can re-check the drain condition.
        self.inner.notify.notify_waiters();
    }

    /// True when no items are queued and none are in flight. Only then may
    /// workers exit; an in-flight job can still push work back.
    pub async fn is_drained(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.ready.is_empty() && state.in_flight == 0
    }

    /// Number of items currently queued (excluding in-flight ones).
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.ready.len()
    }

    /// True when no items are currently queued.
    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.ready.is_empty()
    }

    /// Number of popped items not yet marked done.
    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT_WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_items_come_out_in_fifo_order() {
        let queue = WorkQueue::new(["a", "b", "c"]);

        assert_eq!(queue.pop(SHORT_WAIT).await, Some("a"));
        assert_eq!(queue.pop(SHORT_WAIT).await, Some("b"));
        assert_eq!(queue.pop(SHORT_WAIT).await, Some("c"));
        assert_eq!(queue.pop(SHORT_WAIT).await, None);
    }

    #[tokio::test]
    async fn test_pop_on_empty_queue_returns_none_after_timeout() {
        let queue: WorkQueue<u32> = WorkQueue::new([]);
        assert_eq!(queue.pop(Duration::from_millis(10)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_picks_up_item_pushed_while_waiting() {
        let queue: WorkQueue<u32> = WorkQueue::new([]);
        let pusher = queue.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push(7).await;
        });

        assert_eq!(queue.pop(Duration::from_secs(1)).await, Some(7));
    }

    #[tokio::test]
    async fn test_in_flight_item_keeps_queue_undrained() {
        let queue = WorkQueue::new([1]);

        let item = queue.pop(SHORT_WAIT).await;
        assert_eq!(item, Some(1));
        assert!(queue.is_empty().await);
        assert!(!queue.is_drained().await, "in-flight item must block drain");

        queue.task_done().await;
        assert!(queue.is_drained().await);
    }

    #[tokio::test]
    async fn test_requeue_during_drain_is_observed() {
        let queue = WorkQueue::new([10]);

        let first = queue.pop(SHORT_WAIT).await.unwrap();
        assert_eq!(first, 10);
        // The worker decides to retry this job from scratch.
        queue.push(11).await;
        queue.task_done().await;

        assert!(!queue.is_drained().await);
        assert_eq!(queue.pop(SHORT_WAIT).await, Some(11));
        queue.task_done().await;
        assert!(queue.is_drained().await);
    }

    #[tokio::test]
    async fn test_len_tracks_queued_items_only() {
        let queue = WorkQueue::new([1, 2]);
        assert_eq!(queue.len().await, 2);

        let _item = queue.pop(SHORT_WAIT).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.in_flight().await, 1);
    }
}
