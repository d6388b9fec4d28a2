// ── Background work scheduling ──

mod dispatcher;
mod pool;

pub use dispatcher::{DispatchStrategy, MonitorTask, TaskDispatcher, TaskFuture};
pub use pool::WorkerPool;
