// ── Patch notifications ──
//
// Every create, update and delete of a current device or link is
// echoed to clients as a `PatchUpdate`, but only while the session is
// Running.

use serde::Serialize;

use super::MonitorInner;
use crate::model::notification::{device_path, link_path};
use crate::model::{Action, Device, Link, Notification, OpCode};

impl MonitorInner {
    pub(super) fn notify_device(&self, project_id: i64, action: Action, device: &Device) {
        self.notify_patch(project_id, action, device_path(project_id, device.id), device);
    }

    pub(super) fn notify_link(&self, project_id: i64, action: Action, link: &Link) {
        self.notify_patch(project_id, action, link_path(project_id, link.id), link);
    }

    fn notify_patch(&self, project_id: i64, action: Action, path: String, entity: &impl Serialize) {
        if !self.is_running(project_id) {
            return;
        }
        let notification = match action {
            Action::Delete => Notification::empty(OpCode::PatchUpdate, action, path),
            Action::Create | Action::Update => {
                Notification::new(OpCode::PatchUpdate, action, path, entity)
            }
        };
        self.notifier.notify(project_id, notification);
    }

    /// Send a periodic status payload.
    pub(super) fn publish(
        &self,
        project_id: i64,
        op_code: OpCode,
        action: Action,
        path: String,
        data: &impl Serialize,
    ) {
        self.notifier
            .notify(project_id, Notification::new(op_code, action, path, data));
    }
}
