//! Serial task queue.
//!
//! Admitted events are appended in arrival order and drained by a fixed pool
//! of workers. The default pool size of 1 makes execution strictly serial
//! system-wide: only one build directory tree is in use at any moment, and a
//! long build delays everything queued behind it. Good for servers with low
//! resources, don't bait the OOM killer.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::error::HookError;
use crate::event::{ExecutionParams, PushEvent};

/// Unit of work produced by an admitted webhook request.
#[derive(Debug, Clone)]
pub struct HookTask {
    pub id: Uuid,
    pub event: PushEvent,
    pub params: ExecutionParams,
    pub queued_at: DateTime<Utc>,
}

impl HookTask {
    pub fn new(event: PushEvent, params: ExecutionParams) -> Self {
        Self {
            id: Uuid::now_v7(),
            event,
            params,
            queued_at: Utc::now(),
        }
    }
}

/// FIFO queue drained by a bounded worker pool.
pub struct TaskQueue<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Spawns `workers` drainer tasks and returns the queue handle.
    ///
    /// Each worker pulls the oldest pending task and runs `handler` on it to
    /// completion before pulling the next, so with a single worker tasks
    /// never overlap and execute in exact arrival order.
    pub fn start<F, Fut>(workers: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let handler = handler.clone();
            tokio::spawn(async move {
                debug!(worker, "queue worker started");
                loop {
                    // The receiver lock is held only while waiting for the
                    // next task; the task itself runs with it released.
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => handler(task).await,
                        None => break,
                    }
                }
                debug!(worker, "queue closed, worker exiting");
            });
        }
        TaskQueue { tx }
    }

    /// Appends a task in arrival order.
    pub fn enqueue(&self, task: T) -> Result<(), HookError> {
        self.tx.send(task).map_err(|_| HookError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn single_worker_preserves_arrival_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let queue = TaskQueue::start(1, move |n: usize| {
            let seen = seen.clone();
            async move {
                // Yield before recording so any accidental concurrency would
                // scramble the order.
                sleep(Duration::from_millis(1)).await;
                seen.lock().await.push(n);
            }
        });

        for n in 0..10 {
            queue.enqueue(n).unwrap();
        }

        sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().await, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn single_worker_never_overlaps_tasks() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let (in_flight2, max_seen2, done2) = (in_flight.clone(), max_seen.clone(), done.clone());
        let queue = TaskQueue::start(1, move |_n: usize| {
            let (in_flight, max_seen, done) = (in_flight2.clone(), max_seen2.clone(), done2.clone());
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        for n in 0..8 {
            queue.enqueue(n).unwrap();
        }

        sleep(Duration::from_millis(300)).await;
        assert_eq!(done.load(Ordering::SeqCst), 8);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn two_workers_may_run_concurrently() {
        // Both tasks block on a two-party barrier, so the test only finishes
        // if two tasks are in flight at once.
        let barrier = Arc::new(Barrier::new(2));
        let done = Arc::new(AtomicUsize::new(0));

        let (barrier2, done2) = (barrier.clone(), done.clone());
        let queue = TaskQueue::start(2, move |_n: usize| {
            let (barrier, done) = (barrier2.clone(), done2.clone());
            async move {
                barrier.wait().await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        timeout(Duration::from_secs(1), async {
            while done.load(Ordering::SeqCst) < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both tasks should rendezvous under two workers");
    }

    #[tokio::test]
    async fn zero_workers_is_clamped_to_one() {
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = done.clone();
        let queue = TaskQueue::start(0, move |_n: usize| {
            let done = done2.clone();
            async move {
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.enqueue(1).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
