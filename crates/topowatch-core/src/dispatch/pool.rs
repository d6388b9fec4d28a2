// ── Waitable worker pool ──
//
// N runners pull boxed futures from one bounded queue. Each job runs
// behind `catch_unwind`, so a panicking job is logged and its runner
// keeps going. An outstanding-job counter lets callers wait until
// everything submitted so far has finished.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{CoreError, panic_message};

type Job = BoxFuture<'static, ()>;

/// Fixed-size pool of async task runners.
///
/// Cheaply cloneable: all clones share the same queue and runners.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// `None` once the pool has been closed.
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    tracker: Arc<Tracker>,
    runners: Mutex<Vec<JoinHandle<()>>>,
}

/// Outstanding-job bookkeeping shared with the runners.
#[derive(Default)]
struct Tracker {
    outstanding: AtomicUsize,
    drained: Notify,
}

impl WorkerPool {
    /// Spawn `workers` runners over a queue holding at most `capacity` jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let tracker = Arc::new(Tracker::default());

        let runners = (0..workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&rx), Arc::clone(&tracker))))
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                sender: Mutex::new(Some(tx)),
                tracker,
                runners: Mutex::new(runners),
            }),
        }
    }

    /// Queue a job, waiting for space if the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<(), CoreError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .inner
            .sender
            .lock()
            .await
            .clone()
            .ok_or(CoreError::PoolClosed)?;

        self.inner.tracker.outstanding.fetch_add(1, Ordering::SeqCst);
        if sender.send(job.boxed()).await.is_err() {
            self.inner.tracker.finish_one();
            return Err(CoreError::PoolClosed);
        }
        Ok(())
    }

    /// Number of submitted jobs that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.tracker.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until every job submitted so far has finished.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.tracker.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drain outstanding jobs, stop accepting new ones, and join all runners.
    pub async fn wait_and_close(&self) {
        self.wait().await;
        // Dropping the last sender ends every runner's `recv` loop.
        self.inner.sender.lock().await.take();
        let mut runners = self.inner.runners.lock().await;
        for handle in runners.drain(..) {
            let _ = handle.await;
        }
        debug!("worker pool closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.sender.lock().await.is_none()
    }
}

impl Tracker {
    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

async fn run_worker(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, tracker: Arc<Tracker>) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        if let Err(payload) = AssertUnwindSafe(job).catch_unwind().await {
            error!(worker = id, panic = %panic_message(payload.as_ref()), "worker job panicked");
        }
        tracker.finish_one();
    }
    debug!(worker = id, "worker exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_drains_all_jobs_and_pool_is_reusable() {
        let pool = WorkerPool::new(5, 32);
        let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));

        for round in 0..2 {
            for i in 0..64 {
                let seen = Arc::clone(&seen);
                pool.submit(async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    seen.lock().unwrap().insert(round * 64 + i);
                })
                .await
                .unwrap();
            }
            pool.wait().await;
            assert_eq!(seen.lock().unwrap().len(), (round + 1) * 64);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn panicking_jobs_do_not_kill_runners() {
        let pool = WorkerPool::new(2, 4);
        for i in 0..4 {
            pool.submit(async move {
                panic!("job {i} panic");
            })
            .await
            .unwrap();
        }
        pool.wait().await;

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.wait_and_close().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn closed_pool_rejects_jobs() {
        let pool = WorkerPool::new(1, 1);
        pool.wait_and_close().await;
        assert!(pool.is_closed().await);
        let err = pool.submit(async {}).await.unwrap_err();
        assert!(matches!(err, CoreError::PoolClosed));
    }

    #[tokio::test]
    async fn wait_on_idle_pool_returns_immediately() {
        let pool = WorkerPool::new(1, 1);
        tokio::time::timeout(Duration::from_secs(1), pool.wait())
            .await
            .unwrap();
    }
}
