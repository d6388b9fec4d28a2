// ── Concurrency-safe caches ──
//
// Snapshot-style stores shared by the monitor's background tasks.
// All mutation is internally synchronized.

mod cache;
mod id_mapper;
mod lock_registry;
mod multi_index;
mod topology;

pub use cache::KeyedCache;
pub use id_mapper::DeviceIdMapper;
pub use lock_registry::LockRegistry;
pub use multi_index::MultiIndexCache;
pub use topology::TopologyStore;

pub(crate) use topology::{diff_link, link_key};
