use serde::Serialize;
use tracing::warn;

use crate::error::CoreError;
use crate::model::notification::devices_path;
use crate::model::{Action, ExternalDevice, OpCode, RstpSetting, SwiftSetting};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct SwiftDevice {
    pub device_id: i64,
    pub device_ip: String,
    pub offline: bool,
    pub online: bool,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let Some(baseline) = inner.baseline.load_full() else {
        return Ok(());
    };
    let Some(setting) = baseline.settings.swift.as_ref().filter(|s| s.active) else {
        return Ok(());
    };
    let payload = swift_devices(&inner.store, setting);
    inner.publish(
        project_id,
        OpCode::SwiftStatusUpdate,
        Action::Update,
        devices_path(project_id),
        &payload,
    );
    Ok(())
}

/// Role status of every device in the redundancy group.
///
/// The whole group is offline unless both the root and the backup root
/// are current, discovered and reachable.
pub(super) fn swift_devices(store: &TopologyStore, setting: &SwiftSetting) -> Vec<SwiftDevice> {
    let device_ip = |id: i64| {
        store
            .current_devices
            .get(&id)
            .map(|d| d.ip)
            .unwrap_or_default()
    };
    let anchor_up = |id: i64| {
        store.current_devices.contains(&id)
            && store
                .external_device_by_current(id)
                .is_some_and(|ext| ext.reachable)
    };

    if !anchor_up(setting.root_device) || !anchor_up(setting.backup_root_device) {
        return setting
            .device_tiers
            .keys()
            .map(|&id| SwiftDevice {
                device_id: id,
                device_ip: device_ip(id),
                offline: true,
                online: false,
            })
            .collect();
    }

    setting
        .device_tiers
        .iter()
        .filter_map(|(&id, &tier)| {
            if tier < 0 {
                warn!(device_id = id, tier, "invalid swift tier");
                return None;
            }
            let online = store
                .external_device_by_current(id)
                .is_some_and(|ext| tier_configured(&ext, tier));
            Some(SwiftDevice {
                device_id: id,
                device_ip: device_ip(id),
                offline: !online,
                online,
            })
        })
        .collect()
}

/// Whether a reachable device carries the RSTP settings its tier needs.
fn tier_configured(ext: &ExternalDevice, tier: i64) -> bool {
    let Some(rstp) = ext.rstp().filter(|_| ext.reachable) else {
        return false;
    };
    if rstp.hello_time != 1 {
        return false;
    }
    let RstpSetting {
        bridge_priority,
        swift,
        revert,
        ..
    } = rstp;
    match tier {
        0 => bridge_priority == 4096 && swift == Some(true) && revert == Some(true),
        1 => bridge_priority == 8192 && swift == Some(true) && revert == Some(false),
        _ => bridge_priority == 32768 && swift == Some(false) && revert == Some(false),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::model::{ConfigTable, Device};

    fn device(id: i64) -> Device {
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
        }
    }

    fn discovered(store: &TopologyStore, id: i64, reachable: bool, rstp: serde_json::Value) {
        let ext_id = format!("ext-{id}");
        let mut ext = ExternalDevice {
            id: ext_id.clone(),
            reachable,
            ..ExternalDevice::default()
        };
        ext.configuration.insert(ConfigTable::Rstp, rstp);
        store.current_devices.set(id, device(id));
        store.id_mapper.add(id, ext_id.clone());
        store.external_devices.set(ext_id, ext);
    }

    fn setting() -> SwiftSetting {
        SwiftSetting {
            active: true,
            root_device: 1,
            backup_root_device: 2,
            device_tiers: BTreeMap::from([(1, 0), (2, 1), (3, 2), (4, -1)]),
        }
    }

    #[test]
    fn tiers_must_match_their_rstp_role() {
        let store = TopologyStore::new();
        discovered(&store, 1, true, json!({"HelloTime": 1, "BridgePriority": 4096, "Swift": true, "Revert": true}));
        discovered(&store, 2, true, json!({"HelloTime": 1, "BridgePriority": 8192, "Swift": true, "Revert": false}));
        // Wrong priority for tier 2.
        discovered(&store, 3, true, json!({"HelloTime": 1, "BridgePriority": 4096, "Swift": false, "Revert": false}));

        let status: Vec<(i64, bool, bool)> = swift_devices(&store, &setting())
            .iter()
            .map(|d| (d.device_id, d.online, d.offline))
            .collect();
        assert_eq!(status, vec![(1, true, false), (2, true, false), (3, false, true)]);
    }

    #[test]
    fn unreachable_root_takes_the_group_offline() {
        let store = TopologyStore::new();
        discovered(&store, 1, false, json!({"HelloTime": 1, "BridgePriority": 4096, "Swift": true, "Revert": true}));
        discovered(&store, 2, true, json!({"HelloTime": 1, "BridgePriority": 8192, "Swift": true, "Revert": false}));

        let devices = swift_devices(&store, &setting());
        assert_eq!(devices.len(), 4);
        assert!(devices.iter().all(|d| d.offline && !d.online));
        assert_eq!(devices[2].device_ip, "");
    }
}
