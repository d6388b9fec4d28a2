//! Topology monitor and reconciliation engine for industrial Ethernet
//! projects.
//!
//! A project carries an operator-authored *baseline* topology. While a
//! project is monitored, this crate keeps a *current* topology converged
//! on what an external discovery subsystem observes, persists every
//! change through a repository, and pushes status to connected clients:
//!
//! - **[`Monitor`]**: Lifecycle controller. [`start()`](Monitor::start)
//!   resets the project from its activated baseline, starts discovery and
//!   spawns the session's background work; [`stop()`](Monitor::stop)
//!   cancels it and waits for in-flight jobs. At most one project is
//!   monitored at a time. Settings changes are hot-reloaded.
//!
//! - **Reconciliation**: A push path applies discovery event batches as
//!   they arrive; a periodic full sync re-reads everything and converges
//!   devices, device fields, device configuration, links and link speed.
//!
//! - **[`compute_link_diff`]**: Pure classification of baseline vs.
//!   observed links by canonical, direction-independent identity.
//!
//! - **[`TaskDispatcher`] / [`WorkerPool`]**: Named periodic status tasks
//!   (alive, system status, traffic, management link, SFP, redundancy
//!   roles) run on a bounded pool of runners.
//!
//! - **Collaborators** ([`backend`]): [`Discovery`], [`ProjectRepository`]
//!   and [`Notifier`] traits, with in-memory implementations in
//!   [`backend::memory`].

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod link_diff;
pub mod model;
mod monitor;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{Discovery, MonitorSettings, Notifier, ProjectRepository};
pub use config::{MonitorConfig, VALID_POLLING_RANGE_SECS};
pub use dispatch::{DispatchStrategy, MonitorTask, TaskDispatcher, WorkerPool};
pub use error::CoreError;
pub use link_diff::{DiffLink, Endpoint, InvalidLink, InvalidReason, LinkDiff, compute_link_diff};
pub use monitor::{InternalState, Monitor, MonitorStatus};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Action, Device, DeviceProfile, DiscoveryEvent, ExternalDevice, ExternalLink, Link,
    Notification, OpCode, Project, ProjectSettings, ProjectStatus, ScanRange, SfpLink,
};
