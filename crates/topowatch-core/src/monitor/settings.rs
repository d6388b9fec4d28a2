// ── Discovery settings derivation ──
//
// Turns a project's devices and scan ranges into the parameters handed
// to `Discovery::start_monitor`. Entries with unusable SNMP credentials
// are skipped, never fatal.

use tracing::warn;

use crate::backend::{DeviceSetting, MonitorSettings, RangeSetting, SnmpSetting};
use crate::config::MonitorConfig;
use crate::model::{
    AuthProtocol, Device, PrivacyProtocol, ProjectSettings, SnmpCredential, SnmpVersion,
};

/// Build discovery settings for `devices` plus the ranges in `settings`.
///
/// Keys are positional: `d{i}` for the i-th device and `r{j}` for the
/// j-th range, both counted from zero and including skipped entries.
pub(crate) fn derive_monitor_settings(
    config: &MonitorConfig,
    devices: &[Device],
    settings: &ProjectSettings,
) -> MonitorSettings {
    let devices = devices
        .iter()
        .enumerate()
        .filter_map(|(i, device)| match snmp_setting(device.snmp.as_ref()) {
            Ok(snmp) => Some(DeviceSetting {
                key: format!("d{i}"),
                ip: device.ip.clone(),
                snmp,
            }),
            Err(reason) => {
                warn!(device_id = device.id, ip = %device.ip, reason, "skipping device in monitor settings");
                None
            }
        })
        .collect();

    let ranges = settings
        .scan_ranges
        .iter()
        .enumerate()
        .filter_map(|(j, range)| match snmp_setting(range.snmp.as_ref()) {
            Ok(snmp) => Some(RangeSetting {
                key: format!("r{j}"),
                start_ip: range.start_ip.clone(),
                end_ip: range.end_ip.clone(),
                snmp,
            }),
            Err(reason) => {
                warn!(start = %range.start_ip, end = %range.end_ip, reason, "skipping scan range in monitor settings");
                None
            }
        })
        .collect();

    MonitorSettings {
        polling_interval_secs: config.effective_polling_interval(settings.polling_interval_secs),
        devices,
        ranges,
    }
}

fn snmp_setting(credential: Option<&SnmpCredential>) -> Result<SnmpSetting, &'static str> {
    let cred = credential.ok_or("no SNMP credentials")?;
    let version: SnmpVersion = cred.version.parse().map_err(|_| "unknown SNMP version")?;
    let auth_protocol: AuthProtocol = cred
        .auth_protocol
        .parse()
        .map_err(|_| "unknown SNMP auth protocol")?;
    let privacy_protocol: PrivacyProtocol = cred
        .privacy_protocol
        .parse()
        .map_err(|_| "unknown SNMP privacy protocol")?;

    match version {
        SnmpVersion::V1 | SnmpVersion::V2c if cred.community.is_empty() => {
            return Err("empty SNMP community");
        }
        SnmpVersion::V3 if cred.username.is_empty() => return Err("empty SNMPv3 username"),
        _ => {}
    }

    Ok(SnmpSetting {
        version,
        community: cred.community.clone(),
        username: cred.username.clone(),
        auth_protocol,
        auth_password: cred.auth_password.clone(),
        privacy_protocol,
        privacy_password: cred.privacy_password.clone(),
    })
}
