// ── Per-session topology store ──
//
// Every view the monitor reconciles: baseline, current, and the
// discovery subsystem's external view. Cleared as a whole on Start
// and Stop; individual caches are internally synchronized.

use std::net::IpAddr;

use tracing::warn;

use super::cache::KeyedCache;
use super::id_mapper::DeviceIdMapper;
use super::lock_registry::LockRegistry;
use super::multi_index::MultiIndexCache;
use crate::error::CoreError;
use crate::link_diff::DiffLink;
use crate::model::{Device, ExternalDevice, ExternalLink, Link, Project, SfpLink};

/// Secondary index on link caches: link id as decimal string.
pub(crate) const LINK_ID_INDEX: &str = "link_id";

/// Build a link cache keyed by canonical identity, indexed by link id.
fn link_cache() -> MultiIndexCache<String, Link> {
    let cache = MultiIndexCache::new();
    cache.add_index(LINK_ID_INDEX, |link: &Link| link.id.to_string());
    cache
}

pub struct TopologyStore {
    pub(crate) baseline_devices: KeyedCache<i64, Device>,
    pub(crate) baseline_links: MultiIndexCache<String, Link>,
    pub(crate) current_devices: KeyedCache<i64, Device>,
    pub(crate) current_links: MultiIndexCache<String, Link>,
    /// External devices keyed by the discovery subsystem's id.
    pub(crate) external_devices: KeyedCache<String, ExternalDevice>,
    /// External links keyed by canonical identity.
    pub(crate) external_links: KeyedCache<String, ExternalLink>,
    pub(crate) sfp_links: KeyedCache<i64, SfpLink>,
    pub(crate) id_mapper: DeviceIdMapper,
    pub(crate) link_locks: LockRegistry,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self {
            baseline_devices: KeyedCache::new(),
            baseline_links: link_cache(),
            current_devices: KeyedCache::new(),
            current_links: link_cache(),
            external_devices: KeyedCache::new(),
            external_links: KeyedCache::new(),
            sfp_links: KeyedCache::new(),
            id_mapper: DeviceIdMapper::new(),
            link_locks: LockRegistry::new(),
        }
    }

    pub fn clear(&self) {
        self.baseline_devices.clear();
        self.baseline_links.clear();
        self.current_devices.clear();
        self.current_links.clear();
        self.external_devices.clear();
        self.external_links.clear();
        self.sfp_links.clear();
        self.id_mapper.clear();
        self.link_locks.clear();
    }

    /// Seed baseline and current views from the project snapshot.
    ///
    /// Links whose endpoints cannot be resolved are skipped with a warning.
    pub(crate) fn load_baseline(&self, project: &Project) {
        for device in &project.devices {
            self.baseline_devices.set(device.id, device.clone());
            self.current_devices.set(device.id, device.clone());
        }
        for link in &project.links {
            match link_key(link, &self.baseline_devices) {
                Ok(key) => {
                    self.baseline_links.set(key.clone(), link.clone());
                    self.current_links.set(key, link.clone());
                }
                Err(e) => {
                    warn!(error = %e, link_id = link.id, "skipping baseline link");
                }
            }
        }
    }

    /// Replace the baseline views with a re-fetched snapshot.
    ///
    /// Current and external views are kept; the device-id mapping is
    /// dropped and rebuilt by the next full sync.
    pub(crate) fn reload_baseline(&self, project: &Project) {
        self.baseline_devices
            .replace_all(project.devices.iter().map(|d| (d.id, d.clone())));
        self.baseline_links.clear();
        for link in &project.links {
            match link_key(link, &self.baseline_devices) {
                Ok(key) => self.baseline_links.set(key, link.clone()),
                Err(e) => warn!(error = %e, link_id = link.id, "skipping baseline link"),
            }
        }
        self.id_mapper.clear();
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub(crate) fn current_device_by_ip(&self, ip: &str) -> Option<Device> {
        if ip.is_empty() {
            return None;
        }
        self.current_devices.find(|d| d.ip == ip)
    }

    pub(crate) fn external_device_by_current(&self, current_id: i64) -> Option<ExternalDevice> {
        let ext = self.id_mapper.external_id(current_id)?;
        self.external_devices.get(&ext)
    }

    pub(crate) fn current_link_key(&self, link: &Link) -> Result<String, CoreError> {
        link_key(link, &self.current_devices)
    }

    pub(crate) fn baseline_link_by_id(&self, link_id: i64) -> Option<Link> {
        self.baseline_links
            .get_by_index(LINK_ID_INDEX, &link_id.to_string())
    }

    /// The external link backing a current link, if discovery reports it.
    pub(crate) fn external_link_for(&self, link: &Link) -> Option<ExternalLink> {
        let key = self.current_link_key(link).ok()?;
        self.external_links.get(&key)
    }

    /// Both endpoint devices of a current link.
    pub(crate) fn link_endpoints(&self, link: &Link) -> Result<(Device, Device), CoreError> {
        let src = self
            .current_devices
            .get(&link.source_device_id)
            .ok_or_else(|| CoreError::not_found("device", link.source_device_id))?;
        let dst = self
            .current_devices
            .get(&link.destination_device_id)
            .ok_or_else(|| CoreError::not_found("device", link.destination_device_id))?;
        Ok((src, dst))
    }
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical identity of a project link, resolving endpoint IPs in `devices`.
pub(crate) fn link_key(link: &Link, devices: &KeyedCache<i64, Device>) -> Result<String, CoreError> {
    diff_link(link, devices).map(|dl| dl.to_string())
}

/// Canonical endpoint pair of a project link, resolving endpoint IPs in `devices`.
pub(crate) fn diff_link(link: &Link, devices: &KeyedCache<i64, Device>) -> Result<DiffLink, CoreError> {
    let src = devices
        .get(&link.source_device_id)
        .ok_or_else(|| CoreError::not_found("source device", link.source_device_id))?;
    let dst = devices
        .get(&link.destination_device_id)
        .ok_or_else(|| CoreError::not_found("destination device", link.destination_device_id))?;
    if link.source_interface_id <= 0 || link.destination_interface_id <= 0 {
        return Err(CoreError::ValidationFailed {
            message: format!("link {} has a non-positive interface id", link.id),
        });
    }
    for ip in [&src.ip, &dst.ip] {
        if ip.parse::<IpAddr>().is_err() {
            return Err(CoreError::ValidationFailed {
                message: format!("invalid device IP address format: {ip:?}"),
            });
        }
    }
    Ok(DiffLink::new(
        &src.ip,
        link.source_interface_id,
        &dst.ip,
        link.destination_interface_id,
    ))
}
