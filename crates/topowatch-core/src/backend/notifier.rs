// ── Transport contract ──

use crate::model::Notification;

/// Delivers notifications to every client subscribed to a project.
///
/// Implementations must not block: the monitor calls this from its
/// reconciliation paths.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, project_id: i64, notification: Notification);
}
