//! Snapshot — the read model rebuilt from scratch on every refresh cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::{AttributeValue, DeviceAssignment, DeviceState, DeviceType, STATE_UNAVAILABLE, attr};
use crate::id::{DeviceId, ZoneId};
use crate::time::Timestamp;
use crate::zone::{Zone, ZoneState};

/// Consolidated view of every zone and its devices at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub zones: BTreeMap<ZoneId, ZoneSnapshot>,
    pub safety_alert: bool,
    pub generated_at: Timestamp,
}

impl Snapshot {
    #[must_use]
    pub fn zone(&self, id: &ZoneId) -> Option<&ZoneSnapshot> {
        self.zones.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub id: ZoneId,
    pub name: String,
    pub enabled: bool,
    pub state: ZoneState,
    pub target_temperature: f64,
    pub current_temperature: Option<f64>,
    pub manual_override: bool,
    pub devices: Vec<DeviceSnapshot>,
}

impl ZoneSnapshot {
    /// Summarise `zone`; `devices` are captured separately by the caller.
    #[must_use]
    pub fn capture(zone: &Zone, devices: Vec<DeviceSnapshot>) -> Self {
        Self {
            id: zone.id.clone(),
            name: zone.name.clone(),
            enabled: zone.enabled,
            state: zone.state(),
            target_temperature: zone.target_temperature,
            current_temperature: zone.current_temperature,
            manual_override: zone.manual_override,
            devices,
        }
    }

    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| &d.id == id)
    }
}

/// One assigned device inside a [`ZoneSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub device_type: DeviceType,
    pub name: String,
    pub state: String,
    pub reading: DeviceReading,
}

/// Type-specific fields of a [`DeviceSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceReading {
    /// Attributes copied verbatim from the thermostat.
    Thermostat {
        current_temperature: Option<AttributeValue>,
        target_temperature: Option<AttributeValue>,
        hvac_action: Option<AttributeValue>,
    },
    /// Temperature in degrees Celsius.
    TemperatureSensor { temperature: Option<f64> },
    Valve { position: Option<f64> },
    /// Unknown device types, or devices without any state.
    None,
}

impl DeviceSnapshot {
    /// Build the sub-record for one device.
    ///
    /// Never fails: a device without state is reported `unavailable` and
    /// an unparseable reading degrades to `None`.
    #[must_use]
    pub fn capture(id: &DeviceId, assignment: &DeviceAssignment, state: Option<&DeviceState>) -> Self {
        let Some(state) = state else {
            return Self {
                id: id.clone(),
                device_type: assignment.device_type.clone(),
                name: id.to_string(),
                state: STATE_UNAVAILABLE.to_string(),
                reading: DeviceReading::None,
            };
        };

        let reading = match assignment.device_type {
            DeviceType::Thermostat => DeviceReading::Thermostat {
                current_temperature: state.attribute(attr::CURRENT_TEMPERATURE).cloned(),
                target_temperature: state.attribute(attr::TARGET_TEMPERATURE).cloned(),
                hvac_action: state.attribute(attr::HVAC_ACTION).cloned(),
            },
            DeviceType::TemperatureSensor => DeviceReading::TemperatureSensor {
                temperature: state
                    .numeric_value()
                    .map(|v| state.temperature_unit().to_celsius(v)),
            },
            DeviceType::Valve => DeviceReading::Valve {
                position: state.numeric_value(),
            },
            DeviceType::Other(_) => DeviceReading::None,
        };

        Self {
            id: id.clone(),
            device_type: assignment.device_type.clone(),
            name: state.friendly_name().unwrap_or_else(|| id.to_string()),
            state: state.value.clone(),
            reading,
        }
    }
}
