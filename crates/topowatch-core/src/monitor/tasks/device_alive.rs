use serde::Serialize;

use crate::error::CoreError;
use crate::model::notification::devices_path;
use crate::model::{Action, OpCode};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct DeviceAlive {
    pub id: i64,
    pub ip_address: String,
    pub alive: bool,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let payload = device_alive(&inner.store);
    inner.publish(
        project_id,
        OpCode::AliveUpdate,
        Action::Update,
        devices_path(project_id),
        &payload,
    );
    Ok(())
}

/// Reachability of every current device discovery knows about.
///
/// A baseline device is reported down when discovery has no peer for it
/// or when its profile no longer matches the baseline's.
pub(super) fn device_alive(store: &TopologyStore) -> Vec<DeviceAlive> {
    let mut devices = store.current_devices.values();
    devices.sort_by_key(|d| d.id);

    devices
        .into_iter()
        .filter_map(|device| {
            let baseline = store.baseline_devices.get(&device.id);
            let alive = match (&baseline, store.external_device_by_current(device.id)) {
                (Some(b), _) if b.profile_id != device.profile_id => false,
                (_, Some(ext)) => ext.reachable,
                (Some(_), None) => false,
                (None, None) => return None,
            };
            Some(DeviceAlive {
                id: device.id,
                ip_address: device.ip,
                alive,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Device, ExternalDevice};
    use pretty_assertions::assert_eq;

    fn device(id: i64, ip: &str, profile_id: i64) -> Device {
        Device {
            id,
            ip: ip.into(),
            mac: String::new(),
            profile_id,
            model_name: "EDS-4008".into(),
            firmware_version: String::new(),
            device_name: String::new(),
            interfaces: Vec::new(),
            modules: Vec::new(),
            snmp: None,
        }
    }

    fn external(id: &str, ip: &str, reachable: bool) -> ExternalDevice {
        ExternalDevice {
            id: id.into(),
            ip: ip.into(),
            reachable,
            ..ExternalDevice::default()
        }
    }

    #[test]
    fn reports_reachability_and_baseline_gaps() {
        let store = TopologyStore::new();
        for d in [device(1, "10.0.0.1", 5), device(2, "10.0.0.2", 5), device(3, "10.0.0.3", 5)] {
            store.baseline_devices.set(d.id, d.clone());
            store.current_devices.set(d.id, d);
        }
        // Profile drifted from the baseline.
        store.current_devices.set(3, device(3, "10.0.0.3", 6));
        // Discovered, not part of the baseline.
        store.current_devices.set(4, device(4, "10.0.0.4", 5));
        // Discovered, no external peer any more.
        store.current_devices.set(5, device(5, "10.0.0.5", 5));

        for (cur, ext) in [(1, external("a", "10.0.0.1", true)), (3, external("c", "10.0.0.3", true)), (4, external("d", "10.0.0.4", false))] {
            store.id_mapper.add(cur, ext.id.clone());
            store.external_devices.set(ext.id.clone(), ext);
        }

        let alive: Vec<(i64, bool)> = device_alive(&store).iter().map(|d| (d.id, d.alive)).collect();
        assert_eq!(alive, vec![(1, true), (2, false), (3, false), (4, false)]);
    }

    #[test]
    fn payload_field_names() {
        let value = serde_json::to_value(DeviceAlive {
            id: 1,
            ip_address: "10.0.0.1".into(),
            alive: true,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"Id": 1, "IpAddress": "10.0.0.1", "Alive": true}));
    }
}
