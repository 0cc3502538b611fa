//! Zone store port — the zones, hazard sensors and safety latch.
//!
//! Reads and in-place mutations are synchronous against the store's
//! in-memory model; only [`persist`](ZoneStore::persist) touches storage.

use std::future::Future;

use thermohub_domain::error::{NotFoundError, ThermoError};
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::{DeviceId, ZoneId};
use thermohub_domain::zone::Zone;

pub trait ZoneStore: Send + Sync {
    /// All zones, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the model cannot be read.
    fn zones(&self) -> Result<Vec<Zone>, ThermoError>;

    /// A single zone by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the model cannot be read.
    fn zone(&self, id: &ZoneId) -> Result<Option<Zone>, ThermoError>;

    /// Mutate a zone in place.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::NotFound`] when the zone does not exist.
    fn update_zone<F>(&self, id: &ZoneId, mutate: F) -> Result<Zone, ThermoError>
    where
        F: FnOnce(&mut Zone);

    /// Configured hazard sensors, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the model cannot be read.
    fn hazard_sensors(&self) -> Result<Vec<HazardSensorConfig>, ThermoError>;

    fn safety_alert(&self) -> bool;

    fn set_safety_alert(&self, active: bool);

    /// Write the in-memory model to durable storage.
    fn persist(&self) -> impl Future<Output = Result<(), ThermoError>> + Send;

    /// The zone listing `device_id` among its devices.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the model cannot be read.
    fn zone_for_device(&self, device_id: &DeviceId) -> Result<Option<Zone>, ThermoError> {
        Ok(self
            .zones()?
            .into_iter()
            .find(|zone| zone.owns_device(device_id)))
    }

    /// Enable a zone. Returns `true` if it was disabled before.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::NotFound`] when the zone does not exist.
    fn enable(&self, id: &ZoneId) -> Result<bool, ThermoError> {
        let mut changed = false;
        self.update_zone(id, |zone| changed = zone.enable())?;
        Ok(changed)
    }

    /// Disable a zone. Returns `true` if it was enabled before.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::NotFound`] when the zone does not exist.
    fn disable(&self, id: &ZoneId) -> Result<bool, ThermoError> {
        let mut changed = false;
        self.update_zone(id, |zone| changed = zone.disable())?;
        Ok(changed)
    }
}

impl<T: ZoneStore> ZoneStore for std::sync::Arc<T> {
    fn zones(&self) -> Result<Vec<Zone>, ThermoError> {
        (**self).zones()
    }

    fn zone(&self, id: &ZoneId) -> Result<Option<Zone>, ThermoError> {
        (**self).zone(id)
    }

    fn update_zone<F>(&self, id: &ZoneId, mutate: F) -> Result<Zone, ThermoError>
    where
        F: FnOnce(&mut Zone),
    {
        (**self).update_zone(id, mutate)
    }

    fn hazard_sensors(&self) -> Result<Vec<HazardSensorConfig>, ThermoError> {
        (**self).hazard_sensors()
    }

    fn safety_alert(&self) -> bool {
        (**self).safety_alert()
    }

    fn set_safety_alert(&self, active: bool) {
        (**self).set_safety_alert(active);
    }

    fn persist(&self) -> impl Future<Output = Result<(), ThermoError>> + Send {
        (**self).persist()
    }

    fn zone_for_device(&self, device_id: &DeviceId) -> Result<Option<Zone>, ThermoError> {
        (**self).zone_for_device(device_id)
    }
}

/// Shorthand for the error returned when a zone id is unknown.
#[must_use]
pub fn zone_not_found(id: &ZoneId) -> ThermoError {
    NotFoundError {
        entity: "Zone",
        id: id.to_string(),
    }
    .into()
}
