// ── Collaborator boundary ──
//
// Traits for the three systems the monitor talks to, plus in-memory
// implementations of each.

mod discovery;
pub mod memory;
mod notifier;
mod repository;

pub use discovery::{DeviceSetting, Discovery, MonitorSettings, RangeSetting, SnmpSetting};
pub use notifier::Notifier;
pub use repository::ProjectRepository;
