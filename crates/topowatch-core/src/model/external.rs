// ── Discovery-side (external) entity types ──
//
// Devices and links as the discovery subsystem reports them. External
// devices are keyed by the subsystem's own opaque id; external links are
// keyed by their canonical `ip:port-ip:port` identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::device::{ConfigTable, Module};
use crate::link_diff::DiffLink;

/// Address of the management host; links touching it are management links.
pub const LOCALHOST_IP: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalDevice {
    pub id: String,
    pub ip: String,
    pub mac: String,
    pub model_name: String,
    pub firmware_version: String,
    pub device_name: String,
    /// ICMP reachability as last probed.
    pub reachable: bool,
    pub ports: Vec<ExternalPort>,
    pub modules: Vec<Module>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemStatus>,
    pub configuration: BTreeMap<ConfigTable, serde_json::Value>,
}

impl ExternalDevice {
    pub fn port(&self, id: i64) -> Option<&ExternalPort> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// RSTP settings decoded from the device's configuration table.
    pub fn rstp(&self) -> Option<RstpSetting> {
        let raw = self.configuration.get(&ConfigTable::Rstp)?;
        serde_json::from_value(raw.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalPort {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfp: Option<SfpModule>,
}

/// Optical transceiver readings for one port.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SfpModule {
    pub model: String,
    pub serial_number: String,
    pub temperature_c: String,
    pub temperature_limit_c: String,
    pub rx_power: String,
    pub rx_power_limit: Vec<String>,
    pub tx_power: String,
    pub tx_power_limit: Vec<String>,
    pub voltage: String,
    pub wavelength: String,
}

/// Resource usage as ratios (0.0..=1.0) plus uptime in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemStatus {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub uptime_secs: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RstpSetting {
    pub hello_time: i64,
    pub bridge_priority: i64,
    pub swift: Option<bool>,
    pub revert: Option<bool>,
}

// ── Links ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PortStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    RstpRedundancy,
    Sfp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LinkEnd {
    pub device_id: String,
    pub ip: String,
    pub mac: String,
    pub port: i64,
}

/// Utilisation in hundredths of a per-mille (10000 = 1%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LinkTraffic {
    pub in_utilization: u64,
    pub out_utilization: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalLink {
    pub id: String,
    pub from: LinkEnd,
    pub to: LinkEnd,
    /// Negotiated speed in bits per second.
    pub speed_bps: u64,
    pub status: PortStatus,
    pub kinds: BTreeSet<LinkKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic: Option<LinkTraffic>,
}

impl ExternalLink {
    /// Canonical, direction-independent identity.
    pub fn key(&self) -> String {
        self.diff_link().to_string()
    }

    pub fn diff_link(&self) -> DiffLink {
        DiffLink::new(&self.from.ip, self.from.port, &self.to.ip, self.to.port)
    }

    pub fn is_up(&self) -> bool {
        self.status == PortStatus::Up
    }

    pub fn touches_localhost(&self) -> bool {
        self.from.ip == LOCALHOST_IP || self.to.ip == LOCALHOST_IP
    }

    pub fn speed_mbps(&self) -> u64 {
        self.speed_bps / 1_000_000
    }

    pub fn has_kind(&self, kind: LinkKind) -> bool {
        self.kinds.contains(&kind)
    }
}

// ── Push events ─────────────────────────────────────────────────────

/// One batch of changes pushed by the discovery subsystem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryEvent {
    pub added_devices: Vec<ExternalDevice>,
    pub updated_devices: Vec<ExternalDevice>,
    pub deleted_devices: Vec<ExternalDevice>,
    pub added_links: Vec<ExternalLink>,
    pub updated_links: Vec<ExternalLink>,
    pub deleted_links: Vec<ExternalLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(a: (&str, i64), b: (&str, i64)) -> ExternalLink {
        ExternalLink {
            from: LinkEnd {
                ip: a.0.into(),
                port: a.1,
                ..LinkEnd::default()
            },
            to: LinkEnd {
                ip: b.0.into(),
                port: b.1,
                ..LinkEnd::default()
            },
            speed_bps: 100_000_000,
            status: PortStatus::Up,
            ..ExternalLink::default()
        }
    }

    #[test]
    fn key_is_direction_independent() {
        let ab = link(("192.168.127.2", 3), ("192.168.127.1", 5));
        let ba = link(("192.168.127.1", 5), ("192.168.127.2", 3));
        assert_eq!(ab.key(), ba.key());
        assert_eq!(ab.key(), "192.168.127.1:5-192.168.127.2:3");
    }

    #[test]
    fn speed_is_reported_in_mbps() {
        assert_eq!(link(("10.0.0.1", 1), ("10.0.0.2", 1)).speed_mbps(), 100);
    }

    #[test]
    fn rstp_table_decodes() {
        let mut dev = ExternalDevice::default();
        dev.configuration.insert(
            ConfigTable::Rstp,
            serde_json::json!({"HelloTime": 1, "BridgePriority": 4096, "Swift": true, "Revert": true}),
        );
        let rstp = dev.rstp();
        assert_eq!(
            rstp,
            Some(RstpSetting {
                hello_time: 1,
                bridge_priority: 4096,
                swift: Some(true),
                revert: Some(true),
            })
        );
    }
}
