//! Device state feed port — current device states and a stream of changes.

use thermohub_domain::device::{DeviceState, StateChange};
use thermohub_domain::id::DeviceId;
use tokio::sync::broadcast;

/// Source of device state records.
pub trait DeviceStateFeed: Send + Sync {
    /// The last known state of `device_id`, if it has ever reported one.
    fn current_state(&self, device_id: &DeviceId) -> Option<DeviceState>;

    /// Receive every change published *after* this call.
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
}

impl<T: DeviceStateFeed> DeviceStateFeed for std::sync::Arc<T> {
    fn current_state(&self, device_id: &DeviceId) -> Option<DeviceState> {
        (**self).current_state(device_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        (**self).subscribe()
    }
}
