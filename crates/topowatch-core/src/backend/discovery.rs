// ── Discovery subsystem contract ──
//
// The narrow interface the monitor consumes from the device/network
// management layer. Device I/O (SNMP, NETCONF) stays behind it.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::model::{
    AuthProtocol, DiscoveryEvent, ExternalDevice, ExternalLink, Module, PrivacyProtocol,
    SnmpVersion,
};

/// Parameters handed to [`Discovery::start_monitor`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MonitorSettings {
    pub polling_interval_secs: u64,
    pub devices: Vec<DeviceSetting>,
    pub ranges: Vec<RangeSetting>,
}

/// Monitoring parameters for one individually addressed device (`d{i}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSetting {
    pub key: String,
    pub ip: String,
    pub snmp: SnmpSetting,
}

/// Monitoring parameters for one scan range (`r{j}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeSetting {
    pub key: String,
    pub start_ip: String,
    pub end_ip: String,
    pub snmp: SnmpSetting,
}

/// SNMP credentials with protocol names already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnmpSetting {
    pub version: SnmpVersion,
    pub community: String,
    pub username: String,
    pub auth_protocol: AuthProtocol,
    pub auth_password: String,
    pub privacy_protocol: PrivacyProtocol,
    pub privacy_password: String,
}

#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Begin polling the given devices and ranges.
    async fn start_monitor(&self, settings: &MonitorSettings) -> Result<(), CoreError>;

    /// Stop polling. The subsystem counts as stopped even when this fails.
    async fn stop_monitor(&self) -> Result<(), CoreError>;

    /// Drop the subsystem's cached devices and links.
    async fn reset(&self);

    async fn all_devices(&self) -> Result<Vec<ExternalDevice>, CoreError>;

    async fn all_links(&self) -> Result<Vec<ExternalLink>, CoreError>;

    /// Query a device directly, bypassing the subsystem's cache.
    async fn fetch_device_info(&self, device_id: &str) -> Result<ExternalDevice, CoreError>;

    async fn modules(&self, device_id: &str) -> Result<Vec<Module>, CoreError>;

    /// Subscribe to topology change batches. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent>;
}
