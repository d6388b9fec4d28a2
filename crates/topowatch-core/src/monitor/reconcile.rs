// ── Topology reconciliation ──
//
// Two paths converge the current view on what discovery reports: the
// push loop applies each event batch as it arrives, and the full sync
// loop periodically re-reads everything and walks six ordered stages.

use std::collections::HashSet;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::{MonitorInner, SessionCtx};
use crate::error::CoreError;
use crate::model::{
    Action, ConfigTable, Device, DeviceConfig, DevicePatch, DiscoveryEvent, ExternalDevice,
    Interface, LOCALHOST_IP, MacAddress, UNKNOWN_PROFILE_ID, find_profile,
};

// ── Push path ────────────────────────────────────────────────────────

pub(super) async fn push_loop(
    inner: Arc<MonitorInner>,
    ctx: SessionCtx,
    mut events: broadcast::Receiver<DiscoveryEvent>,
) {
    loop {
        tokio::select! {
            biased;
            () = ctx.token.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => inner.apply_event(&ctx, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(project_id = ctx.project_id, skipped, "discovery events dropped, waiting for full sync");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!(project_id = ctx.project_id, "push loop exited");
}

impl MonitorInner {
    async fn apply_event(&self, ctx: &SessionCtx, event: DiscoveryEvent) {
        if !self.is_running_or_reloading(ctx.project_id) {
            return;
        }
        let store = &self.store;

        for device in event.added_devices {
            self.map_external(&device);
            store.external_devices.set(device.id.clone(), device);
        }
        for device in event.updated_devices {
            if !store.external_devices.contains(&device.id) {
                warn!(device = %device.id, "update for unknown external device");
                continue;
            }
            self.map_external(&device);
            store.external_devices.set(device.id.clone(), device);
        }
        for device in event.deleted_devices {
            store.external_devices.delete(&device.id);
            store.id_mapper.delete_by_external(&device.id);
        }

        for link in event.added_links {
            let key = link.key();
            store.external_links.set(key.clone(), link.clone());
            if link.touches_localhost() {
                continue;
            }
            if link.is_up() && link.speed_mbps() > 0 && !store.current_links.contains(&key) {
                self.materialize_link(ctx, &link).await;
            }
        }
        for link in event.updated_links {
            let key = link.key();
            if !store.external_links.contains(&key) {
                warn!(link = %key, "update for unknown external link");
                continue;
            }
            store.external_links.set(key.clone(), link.clone());
            if link.touches_localhost() {
                continue;
            }
            let alive = link.is_up() && link.speed_mbps() > 0;
            if !store.current_links.contains(&key) {
                if alive {
                    self.materialize_link(ctx, &link).await;
                }
            } else if !alive && !store.baseline_links.contains(&key) {
                self.retire_link(ctx, &key).await;
            }
        }
        for link in event.deleted_links {
            let key = link.key();
            store.external_links.delete(&key);
            if store.current_links.contains(&key) && !store.baseline_links.contains(&key) {
                self.retire_link(ctx, &key).await;
            }
        }
    }

    /// Pair an external device with the current device at its IP.
    fn map_external(&self, device: &ExternalDevice) {
        if let Some(current) = self.store.current_device_by_ip(&device.ip) {
            self.store.id_mapper.add(current.id, device.id.clone());
        }
    }
}

// ── Pull path ────────────────────────────────────────────────────────

pub(super) async fn full_sync_loop(inner: Arc<MonitorInner>, ctx: SessionCtx) {
    let mut interval = tokio::time::interval(inner.config.full_sync_interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = ctx.token.cancelled() => break,
            _ = interval.tick() => {
                match inner.full_sync(&ctx).await {
                    Ok(()) => {}
                    Err(CoreError::Cancelled) => break,
                    Err(e) if e.is_contention() => debug!("monitor busy, skipping full sync"),
                    Err(e) => warn!(project_id = ctx.project_id, error = %e, "full sync failed"),
                }
            }
        }
    }
    debug!(project_id = ctx.project_id, "full sync loop exited");
}

impl MonitorInner {
    /// One pass over every stage, in dependency order.
    pub(super) async fn full_sync(&self, ctx: &SessionCtx) -> Result<(), CoreError> {
        if !self.is_running(ctx.project_id) {
            return Ok(());
        }
        ctx.ensure_live()?;
        self.sync_external(ctx).await?;
        ctx.ensure_live()?;
        self.sync_devices(ctx).await;
        ctx.ensure_live()?;
        self.sync_device_info(ctx).await;
        ctx.ensure_live()?;
        self.sync_device_config(ctx).await?;
        ctx.ensure_live()?;
        self.sync_links(ctx).await;
        ctx.ensure_live()?;
        self.sync_link_speed(ctx).await;
        Ok(())
    }

    /// Stage 1: replace the external view with a fresh snapshot.
    async fn sync_external(&self, ctx: &SessionCtx) -> Result<(), CoreError> {
        let Ok(_session) = self.internal.try_lock() else {
            return Err(CoreError::MonitorBusy);
        };
        let devices = self.discovery.all_devices().await?;
        let links = self.discovery.all_links().await?;
        ctx.ensure_live()?;

        self.store.id_mapper.clear();
        for device in &devices {
            self.map_external(device);
        }
        self.store
            .external_devices
            .replace_all(devices.into_iter().map(|d| (d.id.clone(), d)));
        self.store
            .external_links
            .replace_all(links.into_iter().map(|l| (l.key(), l)));
        Ok(())
    }

    // ── Stage 2: device existence ────────────────────────────────────

    async fn sync_devices(&self, ctx: &SessionCtx) {
        let mut externals = self.store.external_devices.values();
        externals.retain(|d| !d.ip.is_empty() && d.ip != LOCALHOST_IP);
        externals.sort_by(|a, b| a.id.cmp(&b.id));
        let observed_ips: HashSet<&str> = externals.iter().map(|d| d.ip.as_str()).collect();

        let mut orphans: Vec<Device> = self
            .store
            .current_devices
            .values()
            .into_iter()
            .filter(|d| {
                !self.store.baseline_devices.contains(&d.id) && !observed_ips.contains(d.ip.as_str())
            })
            .collect();
        orphans.sort_by_key(|d| d.id);
        for device in orphans {
            self.remove_device(ctx, &device).await;
        }

        for ext in &externals {
            match self.store.current_device_by_ip(&ext.ip) {
                Some(current)
                    if !ext.reachable && !self.store.baseline_devices.contains(&current.id) =>
                {
                    self.remove_device(ctx, &current).await;
                }
                Some(_) => {}
                None if ext.reachable && !ext.model_name.is_empty() => {
                    self.create_device(ctx, ext).await;
                }
                None => {}
            }
        }
    }

    async fn create_device(&self, ctx: &SessionCtx, ext: &ExternalDevice) {
        let info = match self.discovery.fetch_device_info(&ext.id).await {
            Ok(info) => info,
            Err(e) => {
                debug!(device = %ext.id, error = %e, "device info unavailable, using cached view");
                ext.clone()
            }
        };
        let pick = |a: &str, b: &str| if a.is_empty() { b.to_owned() } else { a.to_owned() };

        let model_name = pick(&ext.model_name, &info.model_name);
        let raw_mac = pick(&ext.mac, &info.mac);
        let ports = if ext.ports.is_empty() { &info.ports } else { &ext.ports };
        let modules = if ext.modules.is_empty() { &info.modules } else { &ext.modules };

        let device = Device {
            id: 0,
            ip: ext.ip.clone(),
            mac: normalize_mac(&raw_mac),
            profile_id: find_profile(&self.profiles.load(), &model_name),
            firmware_version: pick(&ext.firmware_version, &info.firmware_version),
            device_name: pick(&ext.device_name, &info.device_name),
            model_name,
            interfaces: ports
                .iter()
                .map(|p| Interface {
                    id: p.id,
                    name: p.name.clone(),
                    supported_speeds: Vec::new(),
                })
                .collect(),
            modules: modules.clone(),
            snmp: None,
        };

        if ctx.token.is_cancelled() {
            return;
        }
        match self.repo.create_device(ctx.project_id, device).await {
            Ok(created) => {
                info!(device_id = created.id, ip = %created.ip, "discovered device added");
                self.store.current_devices.set(created.id, created.clone());
                self.store.id_mapper.add(created.id, ext.id.clone());
                self.notify_device(ctx.project_id, Action::Create, &created);
            }
            Err(e) => warn!(error = %e, ip = %ext.ip, "failed to create discovered device"),
        }
    }

    /// Delete a current device together with every current link touching it.
    async fn remove_device(&self, ctx: &SessionCtx, device: &Device) {
        let attached: Vec<(String, i64)> = self
            .store
            .current_links
            .get_all()
            .into_iter()
            .filter(|(_, l)| l.source_device_id == device.id || l.destination_device_id == device.id)
            .map(|(key, l)| (key, l.id))
            .collect();
        for (key, link_id) in attached {
            debug!(link = %key, link_id, device_id = device.id, "removing link of vanished device");
            self.retire_link(ctx, &key).await;
        }

        if ctx.token.is_cancelled() {
            return;
        }
        match self.repo.delete_device(ctx.project_id, device.id).await {
            Ok(()) => {
                info!(device_id = device.id, ip = %device.ip, "vanished device removed");
                self.store.current_devices.delete(&device.id);
                self.store.id_mapper.delete_by_current(device.id);
                self.notify_device(ctx.project_id, Action::Delete, device);
            }
            Err(e) => warn!(error = %e, device_id = device.id, "failed to delete device"),
        }
    }

    // ── Stage 3: device fields ───────────────────────────────────────

    async fn sync_device_info(&self, ctx: &SessionCtx) {
        let project_id = ctx.project_id;
        let mut devices = self.store.current_devices.values();
        devices.sort_by_key(|d| d.id);

        for device in devices {
            let Some(ext) = self.store.external_device_by_current(device.id) else {
                continue;
            };
            let patch = self.device_patch(&device, &ext).await;
            if patch.is_empty() {
                continue;
            }
            if ctx.token.is_cancelled() {
                return;
            }
            match self.repo.partial_update_device(project_id, &patch).await {
                Ok(()) => {
                    let mut updated = device;
                    patch.apply(&mut updated);
                    self.store.current_devices.set(updated.id, updated.clone());
                    self.notify_device(project_id, Action::Update, &updated);
                }
                Err(e) => warn!(error = %e, device_id = device.id, "failed to update device fields"),
            }
        }
    }

    async fn device_patch(&self, device: &Device, ext: &ExternalDevice) -> DevicePatch {
        let mut patch = DevicePatch::new(device.id);

        let profile_id = find_profile(&self.profiles.load(), &ext.model_name);
        if profile_id != UNKNOWN_PROFILE_ID && profile_id != device.profile_id {
            patch.profile_id = Some(profile_id);
        }
        let mac = normalize_mac(&ext.mac);
        if !mac.is_empty() && mac != device.mac {
            patch.mac = Some(mac);
        }
        if !ext.firmware_version.is_empty() && ext.firmware_version != device.firmware_version {
            patch.firmware_version = Some(ext.firmware_version.clone());
        }
        if !ext.device_name.is_empty() && ext.device_name != device.device_name {
            patch.device_name = Some(ext.device_name.clone());
        }
        match self.discovery.modules(&ext.id).await {
            Ok(modules) if !modules.is_empty() && modules != device.modules => {
                patch.modules = Some(modules);
            }
            Ok(_) => {}
            Err(e) => debug!(device = %ext.id, error = %e, "module layout unavailable"),
        }
        patch
    }

    // ── Stage 4: device configuration ────────────────────────────────

    async fn sync_device_config(&self, ctx: &SessionCtx) -> Result<(), CoreError> {
        let Ok(_session) = self.internal.try_lock() else {
            return Err(CoreError::MonitorBusy);
        };
        let project_id = ctx.project_id;
        let project = self.repo.project(project_id).await?;

        let mut devices = self.store.current_devices.values();
        devices.sort_by_key(|d| d.id);
        for device in devices {
            let Some(ext) = self.store.external_device_by_current(device.id) else {
                continue;
            };
            let existing = project.device_configs.iter().find(|c| c.device_id == device.id);
            let Some(merged) = merge_config(device.id, existing, &ext) else {
                continue;
            };
            ctx.ensure_live()?;
            if let Err(e) = self.repo.update_device_config(project_id, &merged).await {
                warn!(error = %e, device_id = device.id, "failed to update device configuration");
            }
        }
        Ok(())
    }
}

/// Copy the device's reported tables over the stored ones.
///
/// `None` when nothing would change.
fn merge_config(
    device_id: i64,
    existing: Option<&DeviceConfig>,
    ext: &ExternalDevice,
) -> Option<DeviceConfig> {
    let mut merged = existing.cloned().unwrap_or_else(|| DeviceConfig {
        device_id,
        ..DeviceConfig::default()
    });
    for table in ConfigTable::iter() {
        if let Some(value) = ext.configuration.get(&table) {
            merged.tables.insert(table, value.clone());
        }
    }
    match existing {
        Some(old) if *old == merged => None,
        None if merged.tables.is_empty() => None,
        _ => Some(merged),
    }
}

/// Upper-case dash form, or empty when discovery reported garbage.
fn normalize_mac(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    MacAddress::parse(raw).map(String::from).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::RepoOp;
    use crate::monitor::tests::running;
    use serde_json::json;

    #[test]
    fn merge_only_reports_changes() {
        let mut ext = ExternalDevice::default();
        assert_eq!(merge_config(3, None, &ext), None);

        ext.configuration.insert(ConfigTable::Vlan, json!({"Vid": 10}));
        let merged = merge_config(3, None, &ext).unwrap();
        assert_eq!(merged.device_id, 3);
        assert_eq!(merged.tables.get(&ConfigTable::Vlan), Some(&json!({"Vid": 10})));

        assert_eq!(merge_config(3, Some(&merged), &ext), None);

        ext.configuration.insert(ConfigTable::Syslog, json!({"Enabled": true}));
        let again = merge_config(3, Some(&merged), &ext).unwrap();
        assert_eq!(again.tables.len(), 2);
    }

    #[test]
    fn stored_tables_survive_a_partial_report() {
        let existing = DeviceConfig {
            device_id: 1,
            tables: [(ConfigTable::Time, json!({"Ntp": "pool"}))].into(),
        };
        let mut ext = ExternalDevice::default();
        ext.configuration.insert(ConfigTable::Rstp, json!({"HelloTime": 2}));
        let merged = merge_config(1, Some(&existing), &ext).unwrap();
        assert!(merged.tables.contains_key(&ConfigTable::Time));
        assert!(merged.tables.contains_key(&ConfigTable::Rstp));
    }

    #[test]
    fn mac_is_normalized_or_dropped() {
        assert_eq!(normalize_mac("00:90:e8:01:02:03"), "00-90-E8-01-02-03");
        assert_eq!(normalize_mac("garbage"), "");
        assert_eq!(normalize_mac(""), "");
    }

    #[tokio::test]
    async fn torn_down_session_writes_nothing() {
        let (m, repo, ctx) = running();
        let inner = &m.inner;
        let ext = ExternalDevice {
            id: "c".into(),
            ip: "10.0.0.3".into(),
            model_name: "EDS-4008".into(),
            reachable: true,
            ..ExternalDevice::default()
        };
        inner.store.external_devices.set(ext.id.clone(), ext);
        ctx.token.cancel();

        inner.sync_devices(&ctx).await;
        assert_eq!(repo.call_count(RepoOp::CreateDevice), 0);
        assert_eq!(inner.store.current_devices.len(), 2);
        assert!(matches!(inner.full_sync(&ctx).await, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn device_stages_patch_fields_and_copy_config() {
        let (m, repo, ctx) = running();
        let inner = &m.inner;
        let mut ext = ExternalDevice {
            id: "a".into(),
            ip: "10.0.0.1".into(),
            mac: "00:90:e8:aa:bb:cc".into(),
            model_name: "EDS-4008".into(),
            firmware_version: "v3.1".into(),
            reachable: true,
            ..ExternalDevice::default()
        };
        ext.configuration.insert(ConfigTable::Vlan, json!({"Vid": 10}));
        inner.store.external_devices.set(ext.id.clone(), ext.clone());
        inner.map_external(&ext);

        inner.sync_device_info(&ctx).await;
        inner.sync_device_config(&ctx).await.unwrap();

        let current = inner.store.current_devices.get(&1).unwrap();
        assert_eq!(current.mac, "00-90-E8-AA-BB-CC");
        assert_eq!(current.firmware_version, "v3.1");
        let stored = repo.snapshot(1).unwrap();
        assert_eq!(stored.device(1).unwrap().firmware_version, "v3.1");
        assert_eq!(stored.device_configs[0].device_id, 1);

        // A second pass finds nothing left to change.
        inner.sync_device_info(&ctx).await;
        inner.sync_device_config(&ctx).await.unwrap();
        assert_eq!(repo.call_count(RepoOp::PartialUpdateDevice), 1);
        assert_eq!(repo.call_count(RepoOp::UpdateDeviceConfig), 1);
    }
}
