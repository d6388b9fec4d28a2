use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::model::notification::links_path;
use crate::model::{Action, LinkKind, OpCode};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct LinkAlive {
    pub id: i64,
    pub alive: bool,
    pub source_device_id: i64,
    pub source_device_ip: String,
    pub source_interface_id: i64,
    pub destination_device_id: i64,
    pub destination_device_ip: String,
    pub destination_interface_id: i64,
    pub redundancy: bool,
}

pub(super) fn run(inner: &MonitorInner, project_id: i64) -> Result<(), CoreError> {
    let payload = link_alive(&inner.store);
    inner.publish(
        project_id,
        OpCode::AliveUpdate,
        Action::Update,
        links_path(project_id),
        &payload,
    );
    Ok(())
}

/// Status of every current link. Baseline links discovery no longer
/// reports are down; other unreported links are left out.
pub(super) fn link_alive(store: &TopologyStore) -> Vec<LinkAlive> {
    let mut links: Vec<_> = store.current_links.get_all().into_values().collect();
    links.sort_by_key(|l| l.id);

    links
        .into_iter()
        .filter_map(|link| {
            let (src, dst) = match store.link_endpoints(&link) {
                Ok(ends) => ends,
                Err(e) => {
                    debug!(link_id = link.id, error = %e, "skipping link without endpoints");
                    return None;
                }
            };
            let (alive, redundancy) = match store.external_link_for(&link) {
                Some(ext) => (ext.is_up(), ext.has_kind(LinkKind::RstpRedundancy)),
                None if store.baseline_link_by_id(link.id).is_some() => (false, false),
                None => return None,
            };
            Some(LinkAlive {
                id: link.id,
                alive,
                source_device_id: src.id,
                source_device_ip: src.ip,
                source_interface_id: link.source_interface_id,
                destination_device_id: dst.id,
                destination_device_ip: dst.ip,
                destination_interface_id: link.destination_interface_id,
                redundancy,
            })
        })
        .collect()
}
