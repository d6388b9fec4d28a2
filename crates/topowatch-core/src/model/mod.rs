// ── Topology domain model ──
//
// Baseline and current views share `Device` / `Link`; the discovery
// subsystem's view lives in `external`. Notifications are the only
// types that leave the crate towards clients.

pub mod device;
pub mod external;
pub mod link;
pub mod mac;
pub mod notification;
pub mod project;
pub mod sfp;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{
    AuthProtocol, ConfigTable, Device, DeviceConfig, DevicePatch, DeviceProfile, Interface,
    Module, ModuleKind, PrivacyProtocol, SnmpCredential, SnmpVersion, UNKNOWN_PROFILE_ID,
    find_profile,
};
pub use external::{
    DiscoveryEvent, ExternalDevice, ExternalLink, ExternalPort, LOCALHOST_IP, LinkEnd, LinkKind,
    LinkTraffic, PortStatus, RstpSetting, SfpModule, SystemStatus,
};
pub use link::Link;
pub use mac::MacAddress;
pub use notification::{Action, Notification, OpCode};
pub use project::{Project, ProjectSettings, ProjectStatus, ScanRange, SwiftSetting};
pub use sfp::{SfpLink, SfpPort};
