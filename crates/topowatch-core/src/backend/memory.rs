// ── In-memory collaborators ──
//
// Process-local implementations of the three collaborator traits.
// They back the CLI's fixture mode and the test suites, and expose
// failure injection plus call counters for the latter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use strum::Display;
use tokio::sync::broadcast;

use super::discovery::{Discovery, MonitorSettings};
use super::notifier::Notifier;
use super::repository::ProjectRepository;
use crate::error::CoreError;
use crate::model::{
    Device, DeviceConfig, DevicePatch, DeviceProfile, DiscoveryEvent, ExternalDevice,
    ExternalLink, Link, Module, Notification, Project, ProjectSettings, ProjectStatus,
};

const EVENT_CHANNEL_SIZE: usize = 256;
const NOTIFICATION_CHANNEL_SIZE: usize = 1024;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Discovery ────────────────────────────────────────────────────────

/// Scriptable discovery source.
///
/// Devices are keyed by their external id, links by canonical identity.
pub struct MemoryDiscovery {
    devices: DashMap<String, ExternalDevice>,
    links: DashMap<String, ExternalLink>,
    events: broadcast::Sender<DiscoveryEvent>,
    running: AtomicBool,
    last_settings: Mutex<Option<MonitorSettings>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    reset_calls: AtomicUsize,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            devices: DashMap::new(),
            links: DashMap::new(),
            events,
            running: AtomicBool::new(false),
            last_settings: Mutex::new(None),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        }
    }

    /// Seed the observed topology without emitting events.
    pub fn load(&self, devices: Vec<ExternalDevice>, links: Vec<ExternalLink>) {
        for device in devices {
            self.devices.insert(device.id.clone(), device);
        }
        for link in links {
            self.links.insert(link.key(), link);
        }
    }

    pub fn upsert_device(&self, device: ExternalDevice) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn remove_device(&self, device_id: &str) -> Option<ExternalDevice> {
        self.devices.remove(device_id).map(|(_, d)| d)
    }

    pub fn upsert_link(&self, link: ExternalLink) {
        self.links.insert(link.key(), link);
    }

    pub fn remove_link(&self, key: &str) -> Option<ExternalLink> {
        self.links.remove(key).map(|(_, l)| l)
    }

    /// Apply a change batch to the observed topology and push it to subscribers.
    pub fn publish(&self, event: DiscoveryEvent) {
        for device in event.added_devices.iter().chain(&event.updated_devices) {
            self.devices.insert(device.id.clone(), device.clone());
        }
        for device in &event.deleted_devices {
            self.devices.remove(&device.id);
        }
        for link in event.added_links.iter().chain(&event.updated_links) {
            self.links.insert(link.key(), link.clone());
        }
        for link in &event.deleted_links {
            self.links.remove(&link.key());
        }
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_settings(&self) -> Option<MonitorSettings> {
        lock(&self.last_settings).clone()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for MemoryDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn start_monitor(&self, settings: &MonitorSettings) -> Result<(), CoreError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CoreError::discovery("start monitor rejected"));
        }
        *lock(&self.last_settings) = Some(settings.clone());
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_monitor(&self) -> Result<(), CoreError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CoreError::discovery("stop monitor rejected"));
        }
        Ok(())
    }

    async fn reset(&self) {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn all_devices(&self) -> Result<Vec<ExternalDevice>, CoreError> {
        Ok(self.devices.iter().map(|r| r.value().clone()).collect())
    }

    async fn all_links(&self) -> Result<Vec<ExternalLink>, CoreError> {
        Ok(self.links.iter().map(|r| r.value().clone()).collect())
    }

    async fn fetch_device_info(&self, device_id: &str) -> Result<ExternalDevice, CoreError> {
        self.devices
            .get(device_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| CoreError::not_found("external device", device_id))
    }

    async fn modules(&self, device_id: &str) -> Result<Vec<Module>, CoreError> {
        self.devices
            .get(device_id)
            .map(|r| r.value().modules.clone())
            .ok_or_else(|| CoreError::not_found("external device", device_id))
    }

    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }
}

// ── Repository ───────────────────────────────────────────────────────

/// Repository operations, used for failure injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RepoOp {
    Project,
    ActivatedBaseline,
    UpdateProjectStatus,
    UpdateFullProject,
    UpdateProjectSettings,
    DeviceProfiles,
    CreateDevice,
    DeleteDevice,
    CreateLink,
    DeleteLink,
    UpdateLink,
    PartialUpdateDevice,
    UpdateDeviceConfig,
}

/// Projects held in memory: one activated baseline plus one operation copy each.
pub struct MemoryRepository {
    baselines: DashMap<i64, Project>,
    projects: DashMap<i64, Project>,
    profiles: Mutex<Vec<DeviceProfile>>,
    next_id: AtomicI64,
    failing: Mutex<HashSet<RepoOp>>,
    panicking: Mutex<HashSet<RepoOp>>,
    calls: Mutex<Vec<RepoOp>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            baselines: DashMap::new(),
            projects: DashMap::new(),
            profiles: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(10_000),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register `project` as both activated baseline and operation copy.
    pub fn insert_project(&self, project: Project) {
        self.baselines.insert(project.id, project.clone());
        self.projects.insert(project.id, project);
    }

    pub fn set_profiles(&self, profiles: Vec<DeviceProfile>) {
        *lock(&self.profiles) = profiles;
    }

    /// Edit the operation copy in place, as an operator would through the API.
    pub fn edit_project(&self, project_id: i64, edit: impl FnOnce(&mut Project)) -> bool {
        self.projects
            .get_mut(&project_id)
            .map(|mut p| edit(&mut p))
            .is_some()
    }

    /// Edit the activated baseline in place.
    pub fn edit_baseline(&self, project_id: i64, edit: impl FnOnce(&mut Project)) -> bool {
        self.baselines
            .get_mut(&project_id)
            .map(|mut p| edit(&mut p))
            .is_some()
    }

    /// Snapshot of the operation copy without touching the call log.
    pub fn snapshot(&self, project_id: i64) -> Option<Project> {
        self.projects.get(&project_id).map(|p| p.clone())
    }

    pub fn fail_on(&self, op: RepoOp) {
        lock(&self.failing).insert(op);
    }

    /// Make `op` panic instead of returning, as a buggy backend would.
    pub fn panic_on(&self, op: RepoOp) {
        lock(&self.panicking).insert(op);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
        lock(&self.panicking).clear();
    }

    pub fn calls(&self) -> Vec<RepoOp> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: RepoOp) -> usize {
        lock(&self.calls).iter().filter(|c| **c == op).count()
    }

    fn record(&self, op: RepoOp) -> Result<(), CoreError> {
        lock(&self.calls).push(op);
        if lock(&self.panicking).contains(&op) {
            panic!("{op} blew up");
        }
        if lock(&self.failing).contains(&op) {
            return Err(CoreError::persistence(format!("{op} failed")));
        }
        Ok(())
    }

    fn with_project<T>(
        &self,
        project_id: i64,
        f: impl FnOnce(&mut Project) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| CoreError::not_found("project", project_id))?;
        f(&mut project)
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectRepository for MemoryRepository {
    async fn project(&self, project_id: i64) -> Result<Project, CoreError> {
        self.record(RepoOp::Project)?;
        self.snapshot(project_id)
            .ok_or_else(|| CoreError::not_found("project", project_id))
    }

    async fn activated_baseline(&self, project_id: i64) -> Result<Project, CoreError> {
        self.record(RepoOp::ActivatedBaseline)?;
        self.baselines
            .get(&project_id)
            .map(|p| p.clone())
            .ok_or_else(|| CoreError::not_found("baseline", project_id))
    }

    async fn update_project_status(
        &self,
        project_id: i64,
        status: ProjectStatus,
    ) -> Result<(), CoreError> {
        self.record(RepoOp::UpdateProjectStatus)?;
        self.with_project(project_id, |p| {
            p.status = status;
            Ok(())
        })
    }

    async fn update_full_project(&self, project: &Project) -> Result<(), CoreError> {
        self.record(RepoOp::UpdateFullProject)?;
        let status = self
            .projects
            .get(&project.id)
            .map(|p| p.status)
            .unwrap_or_default();
        let mut copy = project.clone();
        copy.status = status;
        self.projects.insert(project.id, copy);
        Ok(())
    }

    async fn update_project_settings(
        &self,
        project_id: i64,
        settings: &ProjectSettings,
    ) -> Result<(), CoreError> {
        self.record(RepoOp::UpdateProjectSettings)?;
        self.with_project(project_id, |p| {
            p.settings.clone_from(settings);
            Ok(())
        })
    }

    async fn device_profiles(&self) -> Result<Vec<DeviceProfile>, CoreError> {
        self.record(RepoOp::DeviceProfiles)?;
        Ok(lock(&self.profiles).clone())
    }

    async fn create_device(&self, project_id: i64, mut device: Device) -> Result<Device, CoreError> {
        self.record(RepoOp::CreateDevice)?;
        device.id = self.allocate_id();
        self.with_project(project_id, |p| {
            p.devices.push(device.clone());
            Ok(device)
        })
    }

    async fn delete_device(&self, project_id: i64, device_id: i64) -> Result<(), CoreError> {
        self.record(RepoOp::DeleteDevice)?;
        self.with_project(project_id, |p| {
            let before = p.devices.len();
            p.devices.retain(|d| d.id != device_id);
            if p.devices.len() == before {
                return Err(CoreError::not_found("device", device_id));
            }
            Ok(())
        })
    }

    async fn create_link(&self, project_id: i64, mut link: Link) -> Result<Link, CoreError> {
        self.record(RepoOp::CreateLink)?;
        link.id = self.allocate_id();
        self.with_project(project_id, |p| {
            p.links.push(link.clone());
            Ok(link)
        })
    }

    async fn delete_link(&self, project_id: i64, link_id: i64) -> Result<(), CoreError> {
        self.record(RepoOp::DeleteLink)?;
        self.with_project(project_id, |p| {
            let before = p.links.len();
            p.links.retain(|l| l.id != link_id);
            if p.links.len() == before {
                return Err(CoreError::not_found("link", link_id));
            }
            Ok(())
        })
    }

    async fn update_link(&self, project_id: i64, link: &Link) -> Result<(), CoreError> {
        self.record(RepoOp::UpdateLink)?;
        self.with_project(project_id, |p| {
            let slot = p
                .links
                .iter_mut()
                .find(|l| l.id == link.id)
                .ok_or_else(|| CoreError::not_found("link", link.id))?;
            slot.clone_from(link);
            Ok(())
        })
    }

    async fn partial_update_device(
        &self,
        project_id: i64,
        patch: &DevicePatch,
    ) -> Result<(), CoreError> {
        self.record(RepoOp::PartialUpdateDevice)?;
        self.with_project(project_id, |p| {
            let device = p
                .devices
                .iter_mut()
                .find(|d| d.id == patch.id)
                .ok_or_else(|| CoreError::not_found("device", patch.id))?;
            patch.apply(device);
            Ok(())
        })
    }

    async fn update_device_config(
        &self,
        project_id: i64,
        config: &DeviceConfig,
    ) -> Result<(), CoreError> {
        self.record(RepoOp::UpdateDeviceConfig)?;
        self.with_project(project_id, |p| {
            match p
                .device_configs
                .iter_mut()
                .find(|c| c.device_id == config.device_id)
            {
                Some(existing) => existing.clone_from(config),
                None => p.device_configs.push(config.clone()),
            }
            Ok(())
        })
    }
}

// ── Notifier ─────────────────────────────────────────────────────────

/// Fans notifications out over a tokio broadcast channel.
pub struct ChannelNotifier {
    tx: broadcast::Sender<(i64, Notification)>,
    sent: AtomicUsize,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self {
            tx,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(i64, Notification)> {
        self.tx.subscribe()
    }

    /// Notifications handed to this notifier so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, project_id: i64, notification: Notification) {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send((project_id, notification));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Action, LinkEnd, OpCode, PortStatus};

    fn ext_link(a: &str, b: &str) -> ExternalLink {
        ExternalLink {
            from: LinkEnd {
                ip: a.into(),
                port: 1,
                ..LinkEnd::default()
            },
            to: LinkEnd {
                ip: b.into(),
                port: 1,
                ..LinkEnd::default()
            },
            status: PortStatus::Up,
            ..ExternalLink::default()
        }
    }

    #[tokio::test]
    async fn discovery_publish_updates_state_and_subscribers() {
        let discovery = MemoryDiscovery::new();
        let mut rx = discovery.subscribe();

        discovery.publish(DiscoveryEvent {
            added_links: vec![ext_link("10.0.0.2", "10.0.0.1")],
            ..DiscoveryEvent::default()
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.added_links.len(), 1);
        let links = discovery.all_links().await.unwrap();
        assert_eq!(links[0].key(), "10.0.0.1:1-10.0.0.2:1");

        discovery.publish(DiscoveryEvent {
            deleted_links: vec![ext_link("10.0.0.1", "10.0.0.2")],
            ..DiscoveryEvent::default()
        });
        assert!(discovery.all_links().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn discovery_failure_injection() {
        let discovery = MemoryDiscovery::new();
        discovery.fail_start(true);
        assert!(discovery.start_monitor(&MonitorSettings::default()).await.is_err());
        assert!(!discovery.is_running());

        discovery.fail_start(false);
        discovery.start_monitor(&MonitorSettings::default()).await.unwrap();
        assert!(discovery.is_running());
        assert_eq!(discovery.start_calls(), 2);
    }

    #[tokio::test]
    async fn repository_assigns_ids_and_logs_calls() {
        let repo = MemoryRepository::new();
        repo.insert_project(Project {
            id: 1,
            ..Project::default()
        });

        let link = repo
            .create_link(1, Link::unsaved((1, 1), (2, 1), 100))
            .await
            .unwrap();
        assert!(link.id > 0);
        assert_eq!(repo.snapshot(1).unwrap().links.len(), 1);

        repo.delete_link(1, link.id).await.unwrap();
        assert!(repo.delete_link(1, link.id).await.is_err());
        assert_eq!(repo.call_count(RepoOp::DeleteLink), 2);
    }

    #[tokio::test]
    async fn repository_failure_injection() {
        let repo = MemoryRepository::new();
        repo.insert_project(Project {
            id: 1,
            ..Project::default()
        });
        repo.fail_on(RepoOp::UpdateProjectStatus);
        let err = repo
            .update_project_status(1, ProjectStatus::Monitoring)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));

        repo.clear_failures();
        repo.update_project_status(1, ProjectStatus::Monitoring)
            .await
            .unwrap();
        assert_eq!(repo.snapshot(1).unwrap().status, ProjectStatus::Monitoring);
    }

    #[tokio::test]
    async fn full_update_keeps_status() {
        let repo = MemoryRepository::new();
        repo.insert_project(Project {
            id: 4,
            status: ProjectStatus::Monitoring,
            ..Project::default()
        });
        let baseline = repo.activated_baseline(4).await.unwrap();
        repo.update_full_project(&Project {
            name: "renamed".into(),
            status: ProjectStatus::Idle,
            ..baseline
        })
        .await
        .unwrap();
        let p = repo.snapshot(4).unwrap();
        assert_eq!((p.name.as_str(), p.status), ("renamed", ProjectStatus::Monitoring));
    }

    #[tokio::test]
    async fn notifier_broadcasts() {
        let notifier = ChannelNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify(
            2,
            Notification::empty(OpCode::EndpointUpdate, Action::Delete, "p".into()),
        );
        let (pid, n) = rx.recv().await.unwrap();
        assert_eq!(pid, 2);
        assert_eq!(n.action, Action::Delete);
        assert_eq!(notifier.sent(), 1);
    }
}
