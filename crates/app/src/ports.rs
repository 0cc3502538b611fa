//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the core and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod device_feed;
pub mod event_bus;
pub mod refresh;
pub mod target_resolver;
pub mod zone_store;

pub use device_feed::DeviceStateFeed;
pub use event_bus::EventPublisher;
pub use refresh::RefreshPort;
pub use target_resolver::{TargetResolver, ZoneTargetResolver};
pub use zone_store::ZoneStore;
