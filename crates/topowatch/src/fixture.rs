//! JSON input files: `run` fixtures and `diff` link lists.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use topowatch_core::{DeviceProfile, DiffLink, ExternalDevice, ExternalLink, Project};

use crate::error::CliError;

/// A project baseline plus the topology discovery should report.
///
/// ```json
/// {
///   "Project":  { "Id": 1, "Devices": [...], "Links": [...], "Settings": {...} },
///   "Profiles": [ { "Id": 7, "ModelName": "EDS-4008" } ],
///   "Devices":  [ { "Id": "ext-1", "Ip": "10.0.0.1", "Reachable": true, ... } ],
///   "Links":    [ { "From": {...}, "To": {...}, "Status": "Up", ... } ]
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Fixture {
    pub project: Project,
    #[serde(default)]
    pub profiles: Vec<DeviceProfile>,
    #[serde(default)]
    pub devices: Vec<ExternalDevice>,
    #[serde(default)]
    pub links: Vec<ExternalLink>,
}

/// One `diff` input link, endpoints written as `ip:port`.
#[derive(Debug, Deserialize)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
}

impl LinkSpec {
    pub fn to_diff_link(&self) -> Result<DiffLink, CliError> {
        let (ip1, port1) = parse_endpoint(&self.a)?;
        let (ip2, port2) = parse_endpoint(&self.b)?;
        Ok(DiffLink::new(ip1, port1, ip2, port2))
    }
}

/// Split `ip:port` at the last colon so bare IPv6 addresses survive.
fn parse_endpoint(text: &str) -> Result<(&str, i64), CliError> {
    let invalid = || CliError::Validation {
        field: "link endpoint".into(),
        reason: format!("expected ip:port, got '{text}'"),
    };
    let (ip, port) = text.rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse().map_err(|_| invalid())?;
    Ok((ip, port))
}

pub fn load_fixture(path: &Path) -> Result<Fixture, CliError> {
    read_json(path)
}

pub fn load_links(path: &Path) -> Result<Vec<DiffLink>, CliError> {
    read_json::<Vec<LinkSpec>>(path)?
        .iter()
        .map(LinkSpec::to_diff_link)
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| CliError::InputFile {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_split_at_last_colon() {
        assert_eq!(parse_endpoint("10.0.0.1:3").unwrap(), ("10.0.0.1", 3));
        assert_eq!(parse_endpoint("fe80::1:8").unwrap(), ("fe80::1", 8));
        assert!(parse_endpoint("10.0.0.1").is_err());
        assert!(parse_endpoint("10.0.0.1:x").is_err());
    }

    #[test]
    fn links_are_canonical_regardless_of_direction() {
        let spec = LinkSpec {
            a: "10.0.0.2:1".into(),
            b: "10.0.0.1:4".into(),
        };
        assert_eq!(spec.to_diff_link().unwrap().to_string(), "10.0.0.1:4-10.0.0.2:1");
    }

    #[test]
    fn fixture_sections_default_to_empty() {
        let fixture: Fixture = serde_json::from_str(r#"{"Project": {"Id": 3}}"#).unwrap();
        assert_eq!(fixture.project.id, 3);
        assert!(fixture.devices.is_empty() && fixture.links.is_empty());
    }
}
