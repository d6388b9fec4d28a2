// ── Monitor controller ──
//
// Lifecycle state machine for the one project being monitored. Start
// and Stop are serialized by a coarse lock; state mutation and hot
// reload by a finer one that background work only ever try-locks.

mod links;
mod patch;
mod reconcile;
mod settings;
mod tasks;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{Discovery, Notifier, ProjectRepository};
use crate::config::MonitorConfig;
use crate::dispatch::{TaskDispatcher, WorkerPool};
use crate::error::{CoreError, panic_message};
use crate::model::{Device, DeviceProfile, Link, Project, ProjectStatus, ScanRange, SfpLink};
use crate::store::{KeyedCache, TopologyStore};

use self::settings::derive_monitor_settings;

// ── State ────────────────────────────────────────────────────────────

/// Per-project lifecycle state. At most one project is ever outside `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum InternalState {
    Stopped,
    Starting,
    Running,
    Reloading,
    Stopping,
    Paused,
}

/// Externally visible monitor status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum MonitorStatus {
    Running,
    Stopped,
    /// The project was never started on this monitor.
    Unknown,
}

#[derive(Debug, Clone, Copy, Display)]
enum LifecycleOp {
    Start,
    Stop,
}

// ── Monitor ──────────────────────────────────────────────────────────

/// Keeps a project's current topology reconciled against discovery.
///
/// Cheaply cloneable; every clone drives the same monitor.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    discovery: Arc<dyn Discovery>,
    repo: Arc<dyn ProjectRepository>,
    notifier: Arc<dyn Notifier>,
    states: KeyedCache<i64, InternalState>,
    store: TopologyStore,
    profiles: ArcSwap<Vec<DeviceProfile>>,
    /// Activated baseline of the running session.
    baseline: ArcSwapOption<Project>,
    /// Polling interval and scan ranges discovery currently runs with.
    active: ArcSwapOption<ActiveSettings>,
    /// Serializes Start and Stop.
    lifecycle: Mutex<()>,
    /// Serializes state mutation. Background work only try-locks it.
    internal: Mutex<Option<Session>>,
}

/// One Start…Stop run.
struct Session {
    ctx: SessionCtx,
    dispatcher: TaskDispatcher,
    loops: Vec<JoinHandle<()>>,
}

/// What background work needs to know about its session.
#[derive(Debug, Clone)]
struct SessionCtx {
    project_id: i64,
    session_id: i64,
    token: CancellationToken,
}

impl SessionCtx {
    /// `Cancelled` once the session is being torn down. Checked before
    /// every write so a loop outliving its session leaves the project alone.
    fn ensure_live(&self) -> Result<(), CoreError> {
        if self.token.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveSettings {
    polling_interval_secs: u64,
    scan_ranges: Vec<ScanRange>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        discovery: Arc<dyn Discovery>,
        repo: Arc<dyn ProjectRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                discovery,
                repo,
                notifier,
                states: KeyedCache::new(),
                store: TopologyStore::new(),
                profiles: ArcSwap::from_pointee(Vec::new()),
                baseline: ArcSwapOption::empty(),
                active: ArcSwapOption::empty(),
                lifecycle: Mutex::new(()),
                internal: Mutex::new(None),
            }),
        }
    }

    /// Start monitoring `project_id`.
    ///
    /// Starting the project that is already active is a no-op. Any
    /// failure, including a panic during setup, leaves the project
    /// `Stopped` with status `Idle`.
    pub async fn start(&self, project_id: i64) -> Result<(), CoreError> {
        self.inner.start(project_id).await
    }

    /// Stop monitoring `project_id` and wait for in-flight work to drain.
    pub async fn stop(&self, project_id: i64) -> Result<(), CoreError> {
        if project_id <= 0 {
            return Err(CoreError::InvalidProjectId { project_id });
        }
        let _lifecycle = self.inner.acquire_lifecycle(LifecycleOp::Stop).await?;
        let mut session = self.inner.internal.lock().await;
        self.inner.teardown(project_id, &mut session, true).await
    }

    pub fn status(&self, project_id: i64) -> MonitorStatus {
        match self.inner.states.get(&project_id) {
            Some(InternalState::Running | InternalState::Reloading) => MonitorStatus::Running,
            Some(_) => MonitorStatus::Stopped,
            None => MonitorStatus::Unknown,
        }
    }

    pub fn state(&self, project_id: i64) -> Option<InternalState> {
        self.inner.states.get(&project_id)
    }

    /// SFP optics of the current links, ordered by link id.
    pub fn sfp_links(&self, project_id: i64) -> Result<Vec<SfpLink>, CoreError> {
        if !self.inner.is_running_or_reloading(project_id) {
            return Err(CoreError::NotRunning { project_id });
        }
        let mut links = self.inner.store.sfp_links.values();
        links.sort_by_key(|l| l.link_id);
        Ok(links)
    }

    /// Current devices, ordered by id.
    pub fn current_devices(&self) -> Vec<Device> {
        let mut devices = self.inner.store.current_devices.values();
        devices.sort_by_key(|d| d.id);
        devices
    }

    /// Current links, ordered by id.
    pub fn current_links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.inner.store.current_links.get_all().into_values().collect();
        links.sort_by_key(|l| l.id);
        links
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

impl MonitorInner {
    async fn start(self: &Arc<Self>, project_id: i64) -> Result<(), CoreError> {
        if project_id <= 0 {
            return Err(CoreError::InvalidProjectId { project_id });
        }
        let _lifecycle = self.acquire_lifecycle(LifecycleOp::Start).await?;
        let mut session = self.internal.lock().await;

        if let Some((active_id, state)) = self.active_project() {
            if active_id == project_id {
                debug!(project_id, %state, "monitor already active");
                return Ok(());
            }
            return Err(CoreError::AnotherProjectMonitoring {
                project_id: active_id,
            });
        }

        info!(project_id, "starting monitor");
        let token = CancellationToken::new();
        let outcome = AssertUnwindSafe(self.setup(project_id, token.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(CoreError::SetupPanicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok(started) => {
                info!(project_id, session_id = started.ctx.session_id, "monitor running");
                *session = Some(started);
                self.states.set(project_id, InternalState::Running);
                Ok(())
            }
            Err(e) => {
                error!(project_id, error = %e, "monitor start failed, rolling back");
                self.rollback_start(project_id, &token).await;
                Err(e)
            }
        }
    }

    async fn setup(
        self: &Arc<Self>,
        project_id: i64,
        token: CancellationToken,
    ) -> Result<Session, CoreError> {
        self.repo.project(project_id).await?;
        self.repo
            .update_project_status(project_id, ProjectStatus::Monitoring)
            .await?;
        self.states.set(project_id, InternalState::Starting);

        let baseline = self.repo.activated_baseline(project_id).await?;
        self.repo.update_full_project(&baseline).await?;
        self.repo.project(project_id).await?;
        self.profiles.store(Arc::new(self.repo.device_profiles().await?));

        self.store.clear();
        self.store.load_baseline(&baseline);
        self.discovery.reset().await;

        let settings = derive_monitor_settings(&self.config, &baseline.devices, &baseline.settings);
        let ctx = SessionCtx {
            project_id,
            session_id: Utc::now().timestamp_millis(),
            token,
        };

        let mut loops = Vec::new();
        let events = self.discovery.subscribe();
        loops.push(tokio::spawn(reconcile::push_loop(
            Arc::clone(self),
            ctx.clone(),
            events,
        )));

        self.discovery.start_monitor(&settings).await?;

        self.active.store(Some(Arc::new(ActiveSettings {
            polling_interval_secs: settings.polling_interval_secs,
            scan_ranges: baseline.settings.scan_ranges.clone(),
        })));
        self.baseline.store(Some(Arc::new(baseline)));

        let pool = WorkerPool::new(self.config.worker_count, self.config.queue_capacity);
        let dispatcher = TaskDispatcher::new(
            pool,
            ctx.token.child_token(),
            self.config.dispatch_interval,
            self.config.one_time_capacity,
        );
        tasks::register_all(self, &dispatcher, project_id).await?;
        dispatcher.start().await;

        loops.push(tokio::spawn(hot_reload_loop(Arc::clone(self), ctx.clone())));
        loops.push(tokio::spawn(reconcile::full_sync_loop(
            Arc::clone(self),
            ctx.clone(),
        )));

        Ok(Session {
            ctx,
            dispatcher,
            loops,
        })
    }

    async fn rollback_start(&self, project_id: i64, token: &CancellationToken) {
        token.cancel();
        if let Err(e) = self.discovery.stop_monitor().await {
            debug!(project_id, error = %e, "discovery stop during rollback failed");
        }
        self.clear_session_views();
        if self.states.contains(&project_id) {
            self.states.set(project_id, InternalState::Stopped);
        }
        if let Err(e) = self
            .repo
            .update_project_status(project_id, ProjectStatus::Idle)
            .await
        {
            warn!(project_id, error = %e, "failed to restore project status");
        }
    }

    /// Tear the running session down.
    ///
    /// `join_loops` is false when called from one of the session's own
    /// loops, which must not await its own handle.
    async fn teardown(
        &self,
        project_id: i64,
        slot: &mut Option<Session>,
        join_loops: bool,
    ) -> Result<(), CoreError> {
        if !self.is_running_or_reloading(project_id) {
            match self.repo.project(project_id).await {
                Ok(project) if project.status == ProjectStatus::Monitoring => {
                    self.set_idle(project_id).await;
                }
                Ok(_) => {}
                Err(e) => warn!(project_id, error = %e, "failed to read project while stopping"),
            }
            return Err(CoreError::NotRunning { project_id });
        }

        info!(project_id, "stopping monitor");
        self.states.set(project_id, InternalState::Stopping);

        if let Err(e) = self.discovery.stop_monitor().await {
            warn!(project_id, error = %e, "discovery stop failed, continuing");
        }

        if let Some(session) = slot.take_if(|s| s.ctx.project_id == project_id) {
            session.ctx.token.cancel();
            session.dispatcher.wait_and_close().await;
            if join_loops {
                for handle in session.loops {
                    if let Err(e) = handle.await {
                        warn!(project_id, error = %e, "session loop ended abnormally");
                    }
                }
            }
        }

        self.clear_session_views();
        self.states.set(project_id, InternalState::Stopped);
        self.set_idle(project_id).await;
        info!(project_id, "monitor stopped");
        Ok(())
    }

    async fn set_idle(&self, project_id: i64) {
        if let Err(e) = self
            .repo
            .update_project_status(project_id, ProjectStatus::Idle)
            .await
        {
            warn!(project_id, error = %e, "failed to set project idle");
        }
    }

    fn clear_session_views(&self) {
        self.store.clear();
        self.baseline.store(None);
        self.active.store(None);
    }

    async fn acquire_lifecycle(&self, op: LifecycleOp) -> Result<MutexGuard<'_, ()>, CoreError> {
        if let Ok(guard) = self.lifecycle.try_lock() {
            return Ok(guard);
        }
        for attempt in 1..=self.config.lock_retry_attempts {
            debug!(%op, attempt, "lifecycle lock busy, retrying");
            tokio::time::sleep(self.config.lock_retry_delay).await;
            if let Ok(guard) = self.lifecycle.try_lock() {
                return Ok(guard);
            }
        }
        Err(self.contention_error(op))
    }

    fn contention_error(&self, op: LifecycleOp) -> CoreError {
        let states = self.states.values();
        match op {
            LifecycleOp::Start if states.contains(&InternalState::Starting) => {
                CoreError::MonitorStarting
            }
            LifecycleOp::Start if states.contains(&InternalState::Stopping) => {
                CoreError::MonitorStopping
            }
            LifecycleOp::Stop if states.contains(&InternalState::Stopping) => {
                CoreError::StopInProgress
            }
            _ => CoreError::MonitorBusy,
        }
    }

    fn active_project(&self) -> Option<(i64, InternalState)> {
        self.states
            .get_all()
            .into_iter()
            .find(|(_, state)| *state != InternalState::Stopped)
    }

    fn is_running(&self, project_id: i64) -> bool {
        self.states.get(&project_id) == Some(InternalState::Running)
    }

    fn is_running_or_reloading(&self, project_id: i64) -> bool {
        matches!(
            self.states.get(&project_id),
            Some(InternalState::Running | InternalState::Reloading)
        )
    }
}

// ── Hot reload ───────────────────────────────────────────────────────

async fn hot_reload_loop(inner: Arc<MonitorInner>, ctx: SessionCtx) {
    let mut interval = tokio::time::interval(inner.config.hot_reload_interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = ctx.token.cancelled() => break,
            _ = interval.tick() => inner.poll_settings(&ctx).await,
        }
    }
    debug!(project_id = ctx.project_id, "hot reload poller exited");
}

impl MonitorInner {
    /// Compare the persisted settings with the active ones; reload on change.
    async fn poll_settings(&self, ctx: &SessionCtx) {
        let project = match self.repo.project(ctx.project_id).await {
            Ok(project) => project,
            Err(e) => {
                warn!(project_id = ctx.project_id, error = %e, "failed to poll project settings");
                return;
            }
        };
        let Some(active) = self.active.load_full() else {
            return;
        };

        let next = ActiveSettings {
            polling_interval_secs: self
                .config
                .effective_polling_interval(project.settings.polling_interval_secs),
            scan_ranges: project.settings.scan_ranges,
        };
        if next == *active {
            return;
        }

        info!(
            project_id = ctx.project_id,
            from_secs = active.polling_interval_secs,
            to_secs = next.polling_interval_secs,
            ranges = next.scan_ranges.len(),
            "monitor settings changed, hot reloading"
        );
        match self.reload(ctx, next).await {
            Ok(()) => info!(project_id = ctx.project_id, "hot reload complete"),
            Err(e) => warn!(project_id = ctx.project_id, error = %e, "hot reload failed"),
        }
    }

    /// Restart discovery with `next` settings.
    ///
    /// Any failure after the state turns `Reloading` stops the monitor.
    async fn reload(&self, ctx: &SessionCtx, next: ActiveSettings) -> Result<(), CoreError> {
        let Ok(mut session) = self.internal.try_lock() else {
            return Err(CoreError::MonitorBusy);
        };
        ctx.ensure_live()?;
        let project_id = ctx.project_id;
        if !self.is_running(project_id) {
            return Err(CoreError::NotRunning { project_id });
        }

        self.states.set(project_id, InternalState::Reloading);
        let outcome = AssertUnwindSafe(self.apply_reload(project_id, &next))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(CoreError::SetupPanicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok(()) => {
                self.active.store(Some(Arc::new(next)));
                self.states.set(project_id, InternalState::Running);
                Ok(())
            }
            Err(e) => {
                error!(project_id, error = %e, "hot reload failed, stopping monitor");
                if let Err(stop_err) = self.teardown(project_id, &mut session, false).await {
                    warn!(project_id, error = %stop_err, "stop after failed hot reload failed");
                }
                Err(e)
            }
        }
    }

    /// Re-fetch the baseline, persist the new settings and restart discovery.
    ///
    /// The current view is left alone; the next full sync converges it.
    async fn apply_reload(&self, project_id: i64, next: &ActiveSettings) -> Result<(), CoreError> {
        let baseline = self.repo.activated_baseline(project_id).await?;

        let mut settings = self.repo.project(project_id).await?.settings;
        settings.polling_interval_secs = i64::try_from(next.polling_interval_secs)
            .map_err(|_| CoreError::Internal("polling interval out of range".into()))?;
        settings.scan_ranges.clone_from(&next.scan_ranges);
        self.repo.update_project_settings(project_id, &settings).await?;

        // A failed stop is tolerated: start_monitor below replaces the settings.
        if let Err(e) = self.discovery.stop_monitor().await {
            warn!(project_id, error = %e, "discovery stop failed during hot reload, continuing");
        }

        let monitor_settings = derive_monitor_settings(&self.config, &baseline.devices, &settings);
        self.store.reload_baseline(&baseline);
        self.baseline.store(Some(Arc::new(baseline)));
        self.discovery.reset().await;
        self.discovery.start_monitor(&monitor_settings).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::{ChannelNotifier, MemoryDiscovery, MemoryRepository};

    pub(super) fn device(id: i64, ip: &str) -> Device {
        Device {
            id,
            ip: ip.into(),
            mac: String::new(),
            profile_id: 7,
            model_name: "EDS-4008".into(),
            firmware_version: String::new(),
            device_name: String::new(),
            interfaces: Vec::new(),
            modules: Vec::new(),
            snmp: None,
        }
    }

    /// Project 1 Running on baseline devices 1 and 2, with a live session
    /// context for driving reconciliation stages directly.
    pub(super) fn running() -> (Monitor, Arc<MemoryRepository>, SessionCtx) {
        let repo = Arc::new(MemoryRepository::new());
        let project = Project {
            id: 1,
            devices: vec![device(1, "10.0.0.1"), device(2, "10.0.0.2")],
            ..Project::default()
        };
        repo.insert_project(project.clone());
        let m = Monitor::new(
            MonitorConfig::default(),
            Arc::new(MemoryDiscovery::new()),
            Arc::clone(&repo) as _,
            Arc::new(ChannelNotifier::new()),
        );
        m.inner.store.load_baseline(&project);
        m.inner.states.set(1, InternalState::Running);
        let ctx = SessionCtx {
            project_id: 1,
            session_id: 1,
            token: CancellationToken::new(),
        };
        (m, repo, ctx)
    }

    fn monitor() -> Monitor {
        Monitor::new(
            MonitorConfig::default(),
            Arc::new(MemoryDiscovery::new()),
            Arc::new(MemoryRepository::new()),
            Arc::new(ChannelNotifier::new()),
        )
    }

    #[test]
    fn status_maps_internal_states() {
        let m = monitor();
        assert_eq!(m.status(1), MonitorStatus::Unknown);
        m.inner.states.set(1, InternalState::Reloading);
        assert_eq!(m.status(1), MonitorStatus::Running);
        m.inner.states.set(1, InternalState::Stopping);
        assert_eq!(m.status(1), MonitorStatus::Stopped);
    }

    #[test]
    fn contention_reports_transitional_state() {
        let m = monitor();
        assert!(matches!(
            m.inner.contention_error(LifecycleOp::Start),
            CoreError::MonitorBusy
        ));
        m.inner.states.set(3, InternalState::Starting);
        assert!(matches!(
            m.inner.contention_error(LifecycleOp::Start),
            CoreError::MonitorStarting
        ));
        m.inner.states.set(3, InternalState::Stopping);
        assert!(matches!(
            m.inner.contention_error(LifecycleOp::Start),
            CoreError::MonitorStopping
        ));
        assert!(matches!(
            m.inner.contention_error(LifecycleOp::Stop),
            CoreError::StopInProgress
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_lock_retries_then_gives_up() {
        let m = monitor();
        let _held = m.inner.lifecycle.lock().await;
        let started = tokio::time::Instant::now();
        let err = m.inner.acquire_lifecycle(LifecycleOp::Stop).await.unwrap_err();
        assert!(matches!(err, CoreError::MonitorBusy));
        assert_eq!(started.elapsed(), std::time::Duration::from_millis(1800));
    }

    #[tokio::test]
    async fn sfp_links_require_running_project() {
        let m = monitor();
        assert!(matches!(
            m.sfp_links(5).unwrap_err(),
            CoreError::NotRunning { project_id: 5 }
        ));
    }

    #[tokio::test]
    async fn failed_start_of_unknown_project_leaves_no_state() {
        let m = monitor();
        let err = m.start(42).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(m.state(42), None);
        assert_eq!(m.status(42), MonitorStatus::Unknown);
    }

    #[test]
    fn cancelled_session_is_not_live() {
        let (_m, _repo, ctx) = running();
        assert!(ctx.ensure_live().is_ok());
        ctx.token.cancel();
        assert!(matches!(ctx.ensure_live(), Err(CoreError::Cancelled)));
    }
}
