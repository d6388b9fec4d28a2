use serde::Serialize;

use crate::error::CoreError;
use crate::model::notification::endpoint_path;
use crate::model::{Action, LOCALHOST_IP, Notification, OpCode};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

/// Where the management host attaches to the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ManagementEndpoint {
    pub device_id: i64,
    pub interface_id: i64,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let path = endpoint_path(project_id);
    let notification = match management_endpoint(&inner.store) {
        Some(endpoint) => Notification::new(OpCode::EndpointUpdate, Action::Update, path, &endpoint),
        None => Notification::empty(OpCode::EndpointUpdate, Action::Delete, path),
    };
    inner.notifier.notify(project_id, notification);
    Ok(())
}

/// First link touching the management host whose other end is a
/// current device, in key order.
pub(super) fn management_endpoint(store: &TopologyStore) -> Option<ManagementEndpoint> {
    let mut links: Vec<_> = store
        .external_links
        .get_all()
        .into_iter()
        .filter(|(_, l)| l.touches_localhost())
        .collect();
    links.sort_by(|a, b| a.0.cmp(&b.0));

    links.into_iter().find_map(|(_, link)| {
        let peer = if link.from.ip == LOCALHOST_IP {
            &link.to
        } else {
            &link.from
        };
        let device = store.current_device_by_ip(&peer.ip)?;
        Some(ManagementEndpoint {
            device_id: device.id,
            interface_id: peer.port,
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Device, ExternalLink, LinkEnd};

    fn end(ip: &str, port: i64) -> LinkEnd {
        LinkEnd {
            ip: ip.into(),
            port,
            ..LinkEnd::default()
        }
    }

    fn link(a: LinkEnd, b: LinkEnd) -> ExternalLink {
        ExternalLink {
            from: a,
            to: b,
            ..ExternalLink::default()
        }
    }

    #[test]
    fn picks_first_resolvable_peer() {
        let store = TopologyStore::new();
        assert_eq!(management_endpoint(&store), None);

        store.current_devices.set(
            4,
            Device {
                id: 4,
                ip: "192.168.127.20".into(),
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
        for l in [
            link(end(LOCALHOST_IP, 1), end("192.168.127.10", 2)),
            link(end("192.168.127.20", 8), end(LOCALHOST_IP, 1)),
            link(end("192.168.127.20", 1), end("192.168.127.30", 1)),
        ] {
            store.external_links.set(l.key(), l);
        }

        assert_eq!(
            management_endpoint(&store),
            Some(ManagementEndpoint {
                device_id: 4,
                interface_id: 8,
            })
        );
    }
}
