// ── Link domain types ──

use serde::{Deserialize, Serialize};

/// A link as it appears in a project (baseline or current view).
///
/// Interface ids double as port numbers: the canonical link identity is
/// built from the endpoint device IPs plus these ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Link {
    pub id: i64,
    pub source_device_id: i64,
    pub source_interface_id: i64,
    pub destination_device_id: i64,
    pub destination_interface_id: i64,
    /// Link speed in Mbps.
    #[serde(default)]
    pub speed_mbps: u64,
}

impl Link {
    /// Template for a link the repository has not assigned an id to yet.
    pub fn unsaved(
        source: (i64, i64),
        destination: (i64, i64),
        speed_mbps: u64,
    ) -> Self {
        Self {
            id: 0,
            source_device_id: source.0,
            source_interface_id: source.1,
            destination_device_id: destination.0,
            destination_interface_id: destination.1,
            speed_mbps,
        }
    }
}
