// ── Project (baseline) domain types ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::device::{Device, DeviceConfig, SnmpCredential};
use super::link::Link;

/// Externally visible project status, persisted with the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum ProjectStatus {
    #[default]
    Idle,
    Monitoring,
}

/// Operator-authored project: the baseline topology plus settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub device_configs: Vec<DeviceConfig>,
}

impl Project {
    pub fn device(&self, id: i64) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectSettings {
    /// Seconds between device polls; validated against 10..=600.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: i64,
    #[serde(default)]
    pub scan_ranges: Vec<ScanRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftSetting>,
}

fn default_polling_interval() -> i64 {
    15
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            polling_interval_secs: default_polling_interval(),
            scan_ranges: Vec::new(),
            swift: None,
        }
    }
}

/// IP range the discovery subsystem sweeps for new devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanRange {
    pub start_ip: String,
    pub end_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp: Option<SnmpCredential>,
}

/// Redundancy ("swift") group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwiftSetting {
    pub active: bool,
    pub root_device: i64,
    pub backup_root_device: i64,
    /// Device id -> tier (0 = root tier).
    #[serde(default)]
    pub device_tiers: BTreeMap<i64, i64>,
}
