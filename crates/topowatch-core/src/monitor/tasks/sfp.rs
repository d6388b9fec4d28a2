// SFP optics of current links. Nothing is sent to clients: the result
// replaces the store's SFP cache, read through `Monitor::sfp_links`.

use crate::error::CoreError;
use crate::model::sfp::celsius_to_fahrenheit;
use crate::model::{Device, ExternalPort, LinkKind, SfpLink, SfpModule, SfpPort};
use crate::monitor::MonitorInner;
use crate::store::TopologyStore;

pub(super) fn run(inner: &MonitorInner, _project_id: i64) -> Result<(), CoreError> {
    let links = sfp_links(&inner.store);
    inner
        .store
        .sfp_links
        .replace_all(links.into_iter().map(|l| (l.link_id, l)));
    Ok(())
}

pub(super) fn sfp_links(store: &TopologyStore) -> Vec<SfpLink> {
    store
        .external_links
        .get_all()
        .into_iter()
        .filter(|(_, ext)| ext.has_kind(LinkKind::Sfp))
        .filter_map(|(key, ext)| {
            let link = store.current_links.get(&key)?;
            let (src, dst) = store.link_endpoints(&link).ok()?;

            let from_dev = store.external_devices.get(&ext.from.device_id)?;
            let to_dev = store.external_devices.get(&ext.to.device_id)?;
            let from_port = from_dev.port(ext.from.port)?;
            let to_port = to_dev.port(ext.to.port)?;
            let from_sfp = optics(from_port)?;
            let to_sfp = optics(to_port)?;

            // Orient by the current link, whichever way discovery saw it.
            let (at_source, at_target) = if ext.from.ip == src.ip {
                ((from_port, from_sfp), (to_port, to_sfp))
            } else {
                ((to_port, to_sfp), (from_port, from_sfp))
            };
            let source = sfp_port(&src, link.source_interface_id, at_source.0, at_source.1);
            let target = sfp_port(&dst, link.destination_interface_id, at_target.0, at_target.1);
            Some(SfpLink {
                link_id: link.id,
                source,
                target,
            })
        })
        .collect()
}

fn optics(port: &ExternalPort) -> Option<&SfpModule> {
    port.sfp.as_ref().filter(|m| !m.model.is_empty())
}

fn sfp_port(device: &Device, interface_id: i64, port: &ExternalPort, sfp: &SfpModule) -> SfpPort {
    SfpPort {
        device_id: device.id,
        device_ip: device.ip.clone(),
        interface_id,
        interface_name: port.id.to_string(),
        model_name: sfp.model.clone(),
        serial_number: sfp.serial_number.clone(),
        rx_power: sfp.rx_power.clone(),
        rx_power_limit: sfp.rx_power_limit.clone(),
        tx_power: sfp.tx_power.clone(),
        tx_power_limit: sfp.tx_power_limit.clone(),
        temperature_c: sfp.temperature_c.clone(),
        temperature_f: celsius_to_fahrenheit(&sfp.temperature_c).unwrap_or_default(),
        temperature_limit_c: sfp.temperature_limit_c.clone(),
        temperature_limit_f: celsius_to_fahrenheit(&sfp.temperature_limit_c).unwrap_or_default(),
        voltage: sfp.voltage.clone(),
        wavelength: sfp.wavelength.clone(),
    }
}
