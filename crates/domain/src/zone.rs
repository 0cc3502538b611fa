//! Zone — a heating area grouping thermostats, sensors and valves.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceAssignment, DeviceType};
use crate::error::{ThermoError, ValidationError};
use crate::id::{DeviceId, ZoneId};

/// Degrees below target before a zone is reported as heating.
pub const HEATING_HYSTERESIS: f64 = 0.5;

/// A heating zone (room, floor, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub enabled: bool,
    pub target_temperature: f64,
    pub current_temperature: Option<f64>,
    pub manual_override: bool,
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceAssignment>,
}

/// Summary state derived from a zone's own fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneState {
    Off,
    Heating,
    Idle,
    Unknown,
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Heating => f.write_str("heating"),
            Self::Idle => f.write_str("idle"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Zone {
    /// Create a builder for constructing a [`Zone`].
    #[must_use]
    pub fn builder() -> ZoneBuilder {
        ZoneBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Validation`] when the id or name is empty or
    /// the target temperature is not finite.
    pub fn validate(&self) -> Result<(), ThermoError> {
        if self.id.as_str().is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if !self.target_temperature.is_finite() {
            return Err(ValidationError::NonFiniteTemperature(self.target_temperature).into());
        }
        Ok(())
    }

    #[must_use]
    pub fn owns_device(&self, device_id: &DeviceId) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    /// Derive the zone summary: `Off` when disabled, `Heating` when the
    /// measured temperature sits more than [`HEATING_HYSTERESIS`] below
    /// target, `Idle` otherwise.
    #[must_use]
    pub fn state(&self) -> ZoneState {
        if !self.enabled {
            return ZoneState::Off;
        }
        match self.current_temperature {
            None => ZoneState::Unknown,
            Some(current) if current < self.target_temperature - HEATING_HYSTERESIS => {
                ZoneState::Heating
            }
            Some(_) => ZoneState::Idle,
        }
    }

    /// Enable the zone. Returns `true` if it was disabled before.
    pub fn enable(&mut self) -> bool {
        let changed = !self.enabled;
        self.enabled = true;
        changed
    }

    /// Disable the zone. Returns `true` if it was enabled before.
    pub fn disable(&mut self) -> bool {
        let changed = self.enabled;
        self.enabled = false;
        changed
    }

    /// Record a user-set target observed on one of the zone's devices.
    pub fn apply_manual_override(&mut self, target: f64) {
        self.target_temperature = target;
        self.manual_override = true;
    }

    /// Hand control back to the scheduler. Returns `true` if an override
    /// was active.
    pub fn clear_manual_override(&mut self) -> bool {
        std::mem::replace(&mut self.manual_override, false)
    }
}

/// Step-by-step builder for [`Zone`].
#[derive(Debug, Default)]
pub struct ZoneBuilder {
    id: Option<ZoneId>,
    name: Option<String>,
    enabled: Option<bool>,
    target_temperature: Option<f64>,
    current_temperature: Option<f64>,
    devices: BTreeMap<DeviceId, DeviceAssignment>,
}

impl ZoneBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<ZoneId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn target_temperature(mut self, target: f64) -> Self {
        self.target_temperature = Some(target);
        self
    }

    #[must_use]
    pub fn current_temperature(mut self, current: f64) -> Self {
        self.current_temperature = Some(current);
        self
    }

    #[must_use]
    pub fn device(mut self, id: impl Into<DeviceId>, device_type: DeviceType) -> Self {
        self.devices
            .insert(id.into(), DeviceAssignment::new(device_type));
        self
    }

    #[must_use]
    pub fn assignment(mut self, id: impl Into<DeviceId>, assignment: DeviceAssignment) -> Self {
        self.devices.insert(id.into(), assignment);
        self
    }

    /// Consume the builder, validate, and return a [`Zone`].
    ///
    /// Zones start enabled at 20 °C unless told otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Validation`] if the id or name is missing.
    pub fn build(self) -> Result<Zone, ThermoError> {
        let zone = Zone {
            id: self.id.unwrap_or_else(|| ZoneId::new("")),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            target_temperature: self.target_temperature.unwrap_or(20.0),
            current_temperature: self.current_temperature,
            manual_override: false,
            devices: self.devices,
        };
        zone.validate()?;
        Ok(zone)
    }
}
