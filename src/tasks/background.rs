//! Background Job Pool
//!
//! Bounded queue drained by a fixed set of worker tasks. Used for the
//! fire-and-forget side effects of a read: L1 backfill after an L2 hit and
//! access-statistics refresh. Callers never wait on these jobs, so a reader
//! may observe slightly stale access counts. A job that panics is logged
//! and counted as finished; its worker keeps running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Tracker {
    pending: AtomicUsize,
    dropped: AtomicU64,
    idle: Notify,
}

impl Tracker {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

// == Background Pool ==
#[derive(Clone)]
pub struct BackgroundPool {
    tx: mpsc::Sender<Job>,
    tracker: Arc<Tracker>,
    workers: Arc<Vec<JoinHandle<()>>>,
}

impl BackgroundPool {
    /// Spawns `workers` tasks sharing a queue of `capacity` jobs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let tracker = Arc::new(Tracker::default());

        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else {
                            debug!(worker = id, "background queue closed");
                            break;
                        };
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!(worker = id, "background job panicked");
                        }
                        tracker.finish_one();
                    }
                })
            })
            .collect();

        Self {
            tx,
            tracker,
            workers: Arc::new(handles),
        }
    }

    // == Submit ==
    /// Queues a job without waiting. Returns false if the queue is full or
    /// closed, in which case the job is dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tracker.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(e) => {
                self.tracker.dropped.fetch_add(1, Ordering::Relaxed);
                self.tracker.finish_one();
                debug!(error = %e, "background job dropped");
                false
            }
        }
    }

    /// Resolves once every accepted job has run.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.tracker.idle.notified();
            if self.tracker.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn pending(&self) -> usize {
        self.tracker.pending.load(Ordering::Acquire)
    }

    /// Jobs rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.tracker.dropped.load(Ordering::Relaxed)
    }

    /// Stops every worker. Queued jobs that have not started are discarded.
    pub fn shutdown(&self) {
        for handle in self.workers.iter() {
            handle.abort();
        }
    }
}
