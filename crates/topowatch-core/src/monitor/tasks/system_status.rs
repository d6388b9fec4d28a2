use serde::Serialize;

use crate::error::CoreError;
use crate::model::notification::devices_path;
use crate::model::{Action, OpCode};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct DeviceSystemStatus {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "CPUUsage")]
    pub cpu_usage: String,
    #[serde(rename = "MemoryUsage")]
    pub memory_usage: String,
    #[serde(rename = "Uptime")]
    pub uptime: String,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let payload = system_status(&inner.store);
    if payload.is_empty() {
        return Ok(());
    }
    inner.publish(
        project_id,
        OpCode::StatusUpdate,
        Action::Update,
        devices_path(project_id),
        &payload,
    );
    Ok(())
}

pub(super) fn system_status(store: &TopologyStore) -> Vec<DeviceSystemStatus> {
    let mut devices = store.current_devices.values();
    devices.sort_by_key(|d| d.id);

    devices
        .into_iter()
        .filter_map(|device| {
            let system = store.external_device_by_current(device.id)?.system?;
            Some(DeviceSystemStatus {
                id: device.id,
                cpu_usage: system.cpu_usage.map(percent).unwrap_or_default(),
                memory_usage: system.memory_usage.map(percent).unwrap_or_default(),
                uptime: system.uptime_secs.map(format_uptime).unwrap_or_default(),
            })
        })
        .collect()
}

/// A 0..=1 ratio as a whole percentage.
fn percent(ratio: f64) -> String {
    format!("{:.0}", (ratio * 100.0).clamp(0.0, 100.0))
}

fn format_uptime(secs: i64) -> String {
    let secs = secs.max(0);
    format!(
        "{}d{}h{}m{}s",
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Device, ExternalDevice, SystemStatus};

    #[test]
    fn percent_is_clamped_and_rounded() {
        assert_eq!(percent(0.254), "25");
        assert_eq!(percent(1.7), "100");
        assert_eq!(percent(-0.2), "0");
    }

    #[test]
    fn uptime_breaks_into_units() {
        assert_eq!(format_uptime(0), "0d0h0m0s");
        assert_eq!(format_uptime(90_061), "1d1h1m1s");
        assert_eq!(format_uptime(3_599), "0d0h59m59s");
    }

    #[test]
    fn only_devices_with_readings_are_reported() {
        let store = TopologyStore::new();
        for id in [1, 2] {
            store.current_devices.set(
                id,
                Device {
                    id,
                    ip: format!("10.0.0.{id}"),
                    mac: String::new(),
                    profile_id: 1,
                    model_name: String::new(),
                    firmware_version: String::new(),
                    device_name: String::new(),
                    interfaces: Vec::new(),
                    modules: Vec::new(),
                    snmp: None,
                },
            );
        }
        store.id_mapper.add(1, "a");
        store.external_devices.set(
            "a".into(),
            ExternalDevice {
                id: "a".into(),
                system: Some(SystemStatus {
                    cpu_usage: Some(0.5),
                    memory_usage: None,
                    uptime_secs: Some(61),
                }),
                ..ExternalDevice::default()
            },
        );

        let report = system_status(&store);
        insta::assert_json_snapshot!(report, @r###"
        [
          {
            "Id": 1,
            "CPUUsage": "50",
            "MemoryUsage": "",
            "Uptime": "0d0h1m1s"
          }
        ]
        "###);
    }
}
