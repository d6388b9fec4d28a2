// ── Periodic status tasks ──
//
// Scheduled on the session's dispatcher. Each task reads the topology
// store, builds one batched payload and hands it to the notifier. A
// task whose project is not Running, or whose session is cancelled,
// does nothing and succeeds.

mod device_alive;
mod link_alive;
mod management;
mod sfp;
mod swift;
mod system_status;
mod traffic;

use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use super::MonitorInner;
use crate::dispatch::{DispatchStrategy, MonitorTask, TaskDispatcher};
use crate::error::CoreError;

pub(super) async fn register_all(
    inner: &Arc<MonitorInner>,
    dispatcher: &TaskDispatcher,
    project_id: i64,
) -> Result<(), CoreError> {
    let tasks = [
        ("device-alive", scheduled(inner, project_id, device_alive::run)),
        ("link-alive", scheduled(inner, project_id, link_alive::run)),
        ("device-system-status", scheduled(inner, project_id, system_status::run)),
        ("traffic", scheduled(inner, project_id, traffic::run)),
        ("management-link", scheduled(inner, project_id, management::run)),
        ("sfp", scheduled(inner, project_id, sfp::run)),
        ("swift", scheduled(inner, project_id, swift::run)),
    ];
    for (name, task) in tasks {
        dispatcher
            .register_task(name, DispatchStrategy::Scheduled, task)
            .await?;
    }
    Ok(())
}

/// Wrap `run` so it only executes while the project is Running.
fn scheduled<F>(inner: &Arc<MonitorInner>, project_id: i64, run: F) -> MonitorTask
where
    F: Fn(&MonitorInner, i64) -> Result<(), CoreError> + Send + Sync + Copy + 'static,
{
    let inner = Arc::clone(inner);
    Arc::new(move |cancel: CancellationToken| {
        let inner = Arc::clone(&inner);
        async move {
            if cancel.is_cancelled() || !inner.is_running(project_id) {
                return Ok(());
            }
            run(&inner, project_id)
        }
        .boxed()
    })
}
