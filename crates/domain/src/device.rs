//! Devices — the actuators and sensors assigned to a zone, and the state
//! records the host platform reports for them.

mod attribute_value;
mod state;

pub use attribute_value::AttributeValue;
pub use state::{
    DeviceState, STATE_UNAVAILABLE, STATE_UNKNOWN, StateChange, TemperatureUnit, attr,
    fahrenheit_to_celsius,
};

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of device is assigned to a zone.
///
/// Unrecognised type names are kept verbatim in [`DeviceType::Other`] so
/// they can still be listed in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceType {
    Thermostat,
    TemperatureSensor,
    Valve,
    Other(String),
}

impl DeviceType {
    /// The canonical lowercase name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Thermostat => "thermostat",
            Self::TemperatureSensor => "temperature_sensor",
            Self::Valve => "valve",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for DeviceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "thermostat" => Self::Thermostat,
            "temperature_sensor" => Self::TemperatureSensor,
            "valve" => Self::Valve,
            _ => Self::Other(value),
        }
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership record of a device inside a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAssignment {
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Optional transport topic (e.g. an MQTT state topic) the device
    /// publishes on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl DeviceAssignment {
    #[must_use]
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            topic: None,
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}
