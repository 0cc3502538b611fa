//! In-process device state registry.
//!
//! Adapters (MQTT bridge, tests, the host platform glue) push state records
//! in; the coordinator and the safety monitor read current states and
//! listen for changes.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use thermohub_domain::device::{DeviceState, StateChange};
use thermohub_domain::id::DeviceId;

use crate::ports::DeviceStateFeed;

/// Last known state per device plus a broadcast of every change.
pub struct StateRegistry {
    states: RwLock<HashMap<DeviceId, DeviceState>>,
    sender: broadcast::Sender<StateChange>,
}

impl StateRegistry {
    /// Create a registry whose change channel buffers `capacity` changes
    /// per listener.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            states: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Record a new state for `device_id` and notify listeners.
    pub fn set_state(&self, device_id: DeviceId, state: DeviceState) -> StateChange {
        let old = self
            .states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.clone(), state.clone());
        self.notify(StateChange {
            device_id,
            old,
            new: Some(state),
        })
    }

    /// Forget `device_id`, notifying listeners with an empty new state.
    pub fn remove(&self, device_id: &DeviceId) -> Option<StateChange> {
        let old = self
            .states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device_id)?;
        Some(self.notify(StateChange {
            device_id: device_id.clone(),
            old: Some(old),
            new: None,
        }))
    }

    /// Number of devices with a known state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, change: StateChange) -> StateChange {
        tracing::trace!(device_id = %change.device_id, "device state changed");
        // send only fails without listeners
        let _ = self.sender.send(change.clone());
        change
    }
}

impl DeviceStateFeed for StateRegistry {
    fn current_state(&self, device_id: &DeviceId) -> Option<DeviceState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }
}
