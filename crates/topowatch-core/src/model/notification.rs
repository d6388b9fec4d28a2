// ── Client notifications ──
//
// Shape of every message handed to the transport collaborator:
// `{OpCode, StatusCode, Action, Path, Data}`.

use serde::Serialize;
use strum::Display;

/// Operation codes understood by connected clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum OpCode {
    AliveUpdate,
    StatusUpdate,
    TrafficUpdate,
    EndpointUpdate,
    SwiftStatusUpdate,
    PatchUpdate,
}

impl From<OpCode> for u16 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::AliveUpdate => 0x0603,
            OpCode::StatusUpdate => 0x0604,
            OpCode::TrafficUpdate => 0x0605,
            OpCode::EndpointUpdate => 0x0607,
            OpCode::SwiftStatusUpdate => 0x0608,
            OpCode::PatchUpdate => 0x1001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Action {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    pub op_code: OpCode,
    pub status_code: i64,
    pub action: Action,
    pub path: String,
    pub data: serde_json::Value,
}

impl Notification {
    /// Build a notification, serialising `data` into the payload.
    ///
    /// Payload types here are plain data structs; a serialisation
    /// failure degrades to `null` rather than dropping the event.
    pub fn new(op_code: OpCode, action: Action, path: String, data: &impl Serialize) -> Self {
        Self {
            op_code,
            status_code: 0,
            action,
            path,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn empty(op_code: OpCode, action: Action, path: String) -> Self {
        Self {
            op_code,
            status_code: 0,
            action,
            path,
            data: serde_json::Value::Null,
        }
    }
}

// ── Resource paths ──────────────────────────────────────────────────

pub fn devices_path(project_id: i64) -> String {
    format!("Projects/{project_id}/Devices")
}

pub fn links_path(project_id: i64) -> String {
    format!("Projects/{project_id}/Links")
}

pub fn device_path(project_id: i64, device_id: i64) -> String {
    format!("Projects/{project_id}/Devices/{device_id}")
}

pub fn link_path(project_id: i64, link_id: i64) -> String {
    format!("Projects/{project_id}/Links/{link_id}")
}

pub fn endpoint_path(project_id: i64) -> String {
    format!("Projects/{project_id}/Endpoint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_serializes_with_numeric_opcode() {
        let n = Notification::new(
            OpCode::PatchUpdate,
            Action::Delete,
            link_path(3, 12),
            &serde_json::Value::Null,
        );
        insta::assert_json_snapshot!(n, @r###"
        {
          "OpCode": 4097,
          "StatusCode": 0,
          "Action": "Delete",
          "Path": "Projects/3/Links/12",
          "Data": null
        }
        "###);
    }

    #[test]
    fn paths_follow_resource_layout() {
        assert_eq!(devices_path(1), "Projects/1/Devices");
        assert_eq!(device_path(1, 9), "Projects/1/Devices/9");
        assert_eq!(endpoint_path(4), "Projects/4/Endpoint");
    }
}
