// ── Device domain types ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Profile id assigned when no profile matches a discovered model.
pub const UNKNOWN_PROFILE_ID: i64 = -1;

/// A device as it appears in a project (baseline or current view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub id: i64,
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default = "unknown_profile")]
    pub profile_id: i64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp: Option<SnmpCredential>,
}

fn unknown_profile() -> i64 {
    UNKNOWN_PROFILE_ID
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Interface {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Supported speeds in Mbps.
    #[serde(default)]
    pub supported_speeds: Vec<u64>,
}

/// Line or power module plugged into a modular device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Module {
    pub slot: i64,
    pub kind: ModuleKind,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    Ethernet,
    Power,
}

/// SNMP credentials as the operator typed them.
///
/// Protocol names stay strings here; `monitor::settings` maps them to
/// `SnmpVersion` / `AuthProtocol` / `PrivacyProtocol` and skips devices
/// whose values do not parse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnmpCredential {
    pub version: String,
    pub community: String,
    pub username: String,
    pub auth_protocol: String,
    pub auth_password: String,
    pub privacy_protocol: String,
    pub privacy_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum SnmpVersion {
    #[strum(serialize = "v1", serialize = "1")]
    V1,
    #[strum(serialize = "v2c", serialize = "2c", serialize = "2")]
    V2c,
    #[strum(serialize = "v3", serialize = "3")]
    V3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum AuthProtocol {
    #[strum(serialize = "none", serialize = "")]
    None,
    #[strum(serialize = "md5")]
    Md5,
    #[strum(serialize = "sha", serialize = "sha1")]
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum PrivacyProtocol {
    #[strum(serialize = "none", serialize = "")]
    None,
    #[strum(serialize = "des")]
    Des,
    #[strum(serialize = "aes")]
    Aes,
}

/// Minimal profile view used to classify discovered devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceProfile {
    pub id: i64,
    pub model_name: String,
}

/// Resolve a profile by model name, falling back to the unknown profile.
pub fn find_profile(profiles: &[DeviceProfile], model_name: &str) -> i64 {
    profiles
        .iter()
        .find(|p| !model_name.is_empty() && p.model_name.eq_ignore_ascii_case(model_name))
        .map_or(UNKNOWN_PROFILE_ID, |p| p.id)
}

/// Partial update applied to an existing project device.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DevicePatch {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<Module>>,
}

impl DevicePatch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profile_id.is_none()
            && self.mac.is_none()
            && self.firmware_version.is_none()
            && self.device_name.is_none()
            && self.modules.is_none()
    }

    pub fn apply(&self, device: &mut Device) {
        if let Some(profile_id) = self.profile_id {
            device.profile_id = profile_id;
        }
        if let Some(ref mac) = self.mac {
            device.mac.clone_from(mac);
        }
        if let Some(ref fw) = self.firmware_version {
            device.firmware_version.clone_from(fw);
        }
        if let Some(ref name) = self.device_name {
            device.device_name.clone_from(name);
        }
        if let Some(ref modules) = self.modules {
            device.modules.clone_from(modules);
        }
    }
}

// ── Device configuration tables ─────────────────────────────────────

/// Configuration table kinds mirrored from the device into the project.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    Display,
)]
pub enum ConfigTable {
    Network,
    Rstp,
    Vlan,
    Pcp,
    LoopProtection,
    LoginPolicy,
    Port,
    Time,
    SnmpTrap,
    Syslog,
    StreamPriority,
    TimeAwareShaper,
}

/// Per-device configuration tables stored with the project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceConfig {
    pub device_id: i64,
    #[serde(default)]
    pub tables: BTreeMap<ConfigTable, serde_json::Value>,
}
