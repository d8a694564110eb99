//! Bounded worker pool: fan-out per-item work within one batch, then a
//! barrier wait (`spec.md` §4.3). Not a background job system -- workers
//! are started at first use and drained/stopped at shutdown.
//!
//! Grounded on `promptkit-executor`'s channel-based task plumbing
//! (`vm_manager::MpscOutputCallback`/`StreamJoin`), generalized from a
//! single-consumer stream join into an N-worker fan-out/barrier.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A bounded pool of cooperative workers. Cloning is cheap: all clones
/// share the same channel, workers, and barrier state.
pub struct WorkerPool {
    sender: AsyncMutex<Option<mpsc::Sender<Task>>>,
    outstanding: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    closed: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Constructs a pool with `num_workers` workers and a task queue of
    /// capacity `num_workers * 10` (`spec.md` §4.3).
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = mpsc::channel::<Task>(num_workers * 10);
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let workers = (0..num_workers)
            .map(|_| {
                let receiver = receiver.clone();
                let outstanding = outstanding.clone();
                let drained = drained.clone();
                tokio::spawn(async move {
                    loop {
                        let task = {
                            let mut guard = receiver.lock().await;
                            guard.recv().await
                        };
                        let Some(task) = task else {
                            break;
                        };
                        task.await;
                        outstanding.fetch_sub(1, Ordering::SeqCst);
                        drained.notify_one();
                    }
                })
            })
            .collect();

        Self {
            sender: AsyncMutex::new(Some(sender)),
            outstanding,
            drained,
            closed: Arc::new(AtomicBool::new(false)),
            workers,
        }
    }

    /// Enqueues a task; awaits if the queue is full (backpressure is
    /// intentional -- the caller must not buffer unbounded work).
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if the pool has been closed.
    pub async fn submit<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.submit_with(f, || {}).await
    }

    /// Like [`submit`](Self::submit), but runs `on_done` after `f`
    /// completes, within the same worker task.
    pub async fn submit_with<F, Fut, D>(&self, f: F, on_done: D) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock().await;
        let Some(sender) = guard.as_ref() else {
            return Err(Error::Cancelled);
        };
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let task: Task = Box::pin(async move {
            f().await;
            on_done();
        });
        sender
            .send(task)
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Blocks until every task submitted so far has completed.
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Forbids further submissions; workers exit once the queue drains.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.sender.lock().await.take();
    }

    /// Waits for outstanding work, closes submissions, and joins workers.
    pub async fn shutdown(self) {
        self.wait().await;
        self.close().await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
