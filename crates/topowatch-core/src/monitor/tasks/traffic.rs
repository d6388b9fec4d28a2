use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::notification::links_path;
use crate::model::{Action, OpCode};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

/// Discovery reports utilisation in units of 1/10000 percent.
const UTILIZATION_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct LinkTrafficStatus {
    pub link_id: i64,
    pub source_device_id: i64,
    pub source_interface_id: i64,
    pub source_traffic_utilization: f64,
    pub destination_device_id: i64,
    pub destination_interface_id: i64,
    pub destination_traffic_utilization: f64,
    /// Mbps.
    pub speed: u64,
    pub timestamp: String,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let payload = link_traffic(&inner.store, Utc::now());
    inner.publish(
        project_id,
        OpCode::TrafficUpdate,
        Action::Update,
        links_path(project_id),
        &payload,
    );
    Ok(())
}

/// Utilisation per direction of every current link whose both ends are
/// mapped to discovered devices.
pub(super) fn link_traffic(store: &TopologyStore, now: DateTime<Utc>) -> Vec<LinkTrafficStatus> {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut links: Vec<_> = store.current_links.get_all().into_values().collect();
    links.sort_by_key(|l| l.id);

    links
        .into_iter()
        .filter_map(|link| {
            store.id_mapper.external_id(link.source_device_id)?;
            store.id_mapper.external_id(link.destination_device_id)?;
            let ext = store.external_link_for(&link)?;
            let traffic = ext.traffic?;
            let src = store.current_devices.get(&link.source_device_id)?;

            // Discovery may report the link in the opposite direction.
            let (at_source, at_destination) = if ext.from.ip == src.ip {
                (traffic.in_utilization, traffic.out_utilization)
            } else {
                (traffic.out_utilization, traffic.in_utilization)
            };
            Some(LinkTrafficStatus {
                link_id: link.id,
                source_device_id: link.source_device_id,
                source_interface_id: link.source_interface_id,
                source_traffic_utilization: scaled(at_source),
                destination_device_id: link.destination_device_id,
                destination_interface_id: link.destination_interface_id,
                destination_traffic_utilization: scaled(at_destination),
                speed: ext.speed_mbps(),
                timestamp: timestamp.clone(),
            })
        })
        .collect()
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn scaled(raw: u64) -> f64 {
    raw as f64 / UTILIZATION_SCALE
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{Device, ExternalLink, Link, LinkEnd, LinkTraffic, PortStatus};

    fn device(id: i64, ip: &str) -> Device {
        Device {
            id,
            ip: ip.into(),
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

    fn end(ip: &str, port: i64) -> LinkEnd {
        LinkEnd {
            ip: ip.into(),
            port,
            ..LinkEnd::default()
        }
    }

    #[test]
    fn utilization_follows_the_current_link_direction() {
        let store = TopologyStore::new();
        store.current_devices.set(1, device(1, "10.0.0.1"));
        store.current_devices.set(2, device(2, "10.0.0.2"));
        let link = Link {
            id: 7,
            ..Link::unsaved((1, 3), (2, 4), 1000)
        };
        store
            .current_links
            .set(store.current_link_key(&link).unwrap(), link);

        let ext = ExternalLink {
            from: end("10.0.0.2", 4),
            to: end("10.0.0.1", 3),
            speed_bps: 1_000_000_000,
            status: PortStatus::Up,
            traffic: Some(LinkTraffic {
                in_utilization: 25_000,
                out_utilization: 5_000,
            }),
            ..ExternalLink::default()
        };
        store.external_links.set(ext.key(), ext);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        // Unmapped endpoints yield nothing.
        assert!(link_traffic(&store, now).is_empty());

        store.id_mapper.add(1, "a");
        store.id_mapper.add(2, "b");
        let report = link_traffic(&store, now);
        assert_eq!(report.len(), 1);
        let t = &report[0];
        assert_eq!((t.link_id, t.speed), (7, 1000));
        assert!((t.source_traffic_utilization - 0.5).abs() < f64::EPSILON);
        assert!((t.destination_traffic_utilization - 2.5).abs() < f64::EPSILON);
        assert_eq!(t.timestamp, "2024-05-01T12:00:00Z");
    }
}
