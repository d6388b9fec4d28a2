// ── Task dispatcher ──
//
// Named units of work scheduled onto a `WorkerPool` under one of three
// policies. Two loops run per dispatcher: a fixed-interval tick that
// submits every scheduled task, and a drain loop for one-time tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pool::WorkerPool;
use crate::error::CoreError;

pub type TaskFuture = BoxFuture<'static, Result<(), CoreError>>;

/// A unit of work. Receives the session token so it can bail out early.
pub type MonitorTask = Arc<dyn Fn(CancellationToken) -> TaskFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DispatchStrategy {
    /// Submitted once, as soon as the dispatcher's drain loop sees it.
    OneTime,
    /// Submitted on every dispatcher tick.
    Scheduled,
    /// Submitted only through [`TaskDispatcher::trigger_task`].
    EventTriggered,
}

#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    pool: WorkerPool,
    cancel: CancellationToken,
    interval: Duration,
    scheduled: Mutex<BTreeMap<String, MonitorTask>>,
    event_triggered: Mutex<BTreeMap<String, MonitorTask>>,
    one_time_tx: mpsc::Sender<(String, MonitorTask)>,
    one_time_rx: Mutex<Option<mpsc::Receiver<(String, MonitorTask)>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskDispatcher {
    pub fn new(
        pool: WorkerPool,
        cancel: CancellationToken,
        interval: Duration,
        one_time_capacity: usize,
    ) -> Self {
        let (one_time_tx, one_time_rx) = mpsc::channel(one_time_capacity.max(1));
        Self {
            inner: Arc::new(DispatcherInner {
                pool,
                cancel,
                interval,
                scheduled: Mutex::new(BTreeMap::new()),
                event_triggered: Mutex::new(BTreeMap::new()),
                one_time_tx,
                one_time_rx: Mutex::new(Some(one_time_rx)),
                loops: Mutex::new(Vec::new()),
            }),
        }
    }

    pub async fn register_task(
        &self,
        name: impl Into<String>,
        strategy: DispatchStrategy,
        task: MonitorTask,
    ) -> Result<(), CoreError> {
        let name = name.into();
        debug!(task = %name, %strategy, "registering task");
        match strategy {
            DispatchStrategy::OneTime => self
                .inner
                .one_time_tx
                .send((name, task))
                .await
                .map_err(|_| CoreError::PoolClosed),
            DispatchStrategy::Scheduled => {
                self.inner.scheduled.lock().await.insert(name, task);
                Ok(())
            }
            DispatchStrategy::EventTriggered => {
                self.inner.event_triggered.lock().await.insert(name, task);
                Ok(())
            }
        }
    }

    /// Spawn the scheduled-tick and one-time drain loops.
    ///
    /// Calling `start` twice spawns a second tick loop but never a second
    /// drain loop.
    pub async fn start(&self) {
        let mut loops = self.inner.loops.lock().await;

        let inner = Arc::clone(&self.inner);
        loops.push(tokio::spawn(scheduled_loop(inner)));

        if let Some(rx) = self.inner.one_time_rx.lock().await.take() {
            let inner = Arc::clone(&self.inner);
            loops.push(tokio::spawn(one_time_loop(inner, rx)));
        }
    }

    /// Submit a registered event-triggered task now.
    pub async fn trigger_task(&self, name: &str) -> Result<(), CoreError> {
        let task = self
            .inner
            .event_triggered
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::TaskNotFound {
                name: name.to_owned(),
            })?;
        self.inner.submit(name.to_owned(), &task).await
    }

    pub async fn scheduled_task_names(&self) -> Vec<String> {
        self.inner.scheduled.lock().await.keys().cloned().collect()
    }

    /// Stop both loops, drain the pool, and close it.
    pub async fn wait_and_close(&self) {
        self.inner.cancel.cancel();
        let mut loops = self.inner.loops.lock().await;
        for handle in loops.drain(..) {
            let _ = handle.await;
        }
        self.inner.pool.wait_and_close().await;
    }
}

impl DispatcherInner {
    async fn submit(&self, name: String, task: &MonitorTask) -> Result<(), CoreError> {
        let task = Arc::clone(task);
        let cancel = self.cancel.clone();
        self.pool
            .submit(async move {
                // The task is invoked inside the job so a panic while
                // building its future is isolated too.
                if let Err(e) = task(cancel).await {
                    warn!(task = %name, error = %e, "monitor task failed");
                }
            })
            .await
    }
}

async fn scheduled_loop(inner: Arc<DispatcherInner>) {
    let mut interval = tokio::time::interval(inner.interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            _ = interval.tick() => {
                let tasks: Vec<(String, MonitorTask)> = inner
                    .scheduled
                    .lock()
                    .await
                    .iter()
                    .map(|(name, task)| (name.clone(), Arc::clone(task)))
                    .collect();
                for (name, task) in tasks {
                    if let Err(e) = inner.submit(name.clone(), &task).await {
                        warn!(task = %name, error = %e, "failed to submit scheduled task");
                    }
                }
            }
        }
    }
    debug!("scheduled task loop exited");
}

async fn one_time_loop(
    inner: Arc<DispatcherInner>,
    mut rx: mpsc::Receiver<(String, MonitorTask)>,
) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            next = rx.recv() => {
                let Some((name, task)) = next else { break };
                if let Err(e) = inner.submit(name.clone(), &task).await {
                    warn!(task = %name, error = %e, "failed to submit one-time task");
                }
            }
        }
    }
    debug!("one-time task loop exited");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::FutureExt;

    use super::*;

    fn counting_task(counter: &Arc<AtomicUsize>) -> MonitorTask {
        let counter = Arc::clone(counter);
        Arc::new(move |_cancel| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }

    fn dispatcher() -> TaskDispatcher {
        TaskDispatcher::new(
            WorkerPool::new(2, 8),
            CancellationToken::new(),
            Duration::from_secs(3),
            32,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_tasks_run_every_tick() {
        let d = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        d.register_task("alive", DispatchStrategy::Scheduled, counting_task(&count))
            .await
            .unwrap();
        d.start().await;

        // Nothing before the first interval elapses.
        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(6_200)).await;
        d.wait_and_close().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn one_time_task_runs_once() {
        let d = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        d.register_task("boot", DispatchStrategy::OneTime, counting_task(&count))
            .await
            .unwrap();
        d.start().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while count.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        d.wait_and_close().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_unknown_task_fails() {
        let d = dispatcher();
        let err = d.trigger_task("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::TaskNotFound { ref name } if name == "missing"));
    }

    #[tokio::test]
    async fn trigger_runs_event_task_on_demand() {
        let d = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        d.register_task("resync", DispatchStrategy::EventTriggered, counting_task(&count))
            .await
            .unwrap();
        d.trigger_task("resync").await.unwrap();
        d.trigger_task("resync").await.unwrap();
        d.wait_and_close().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(d.scheduled_task_names().await.is_empty());
    }

    #[tokio::test]
    async fn failing_and_panicking_tasks_are_isolated() {
        let d = dispatcher();
        let failing: MonitorTask =
            Arc::new(|_| async { Err(CoreError::Internal("boom".into())) }.boxed());
        let panicking: MonitorTask = Arc::new(|_| panic!("task construction panicked"));
        let count = Arc::new(AtomicUsize::new(0));

        for (name, task) in [("fail", failing), ("panic", panicking), ("ok", counting_task(&count))] {
            d.register_task(name, DispatchStrategy::EventTriggered, task)
                .await
                .unwrap();
            d.trigger_task(name).await.unwrap();
        }
        d.wait_and_close().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
