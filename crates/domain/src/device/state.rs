//! Device state records and the changes between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;
use crate::time::{Timestamp, now};

use super::AttributeValue;

/// Well-known attribute names.
pub mod attr {
    /// Setpoint of a thermostat.
    pub const TARGET_TEMPERATURE: &str = "temperature";
    pub const CURRENT_TEMPERATURE: &str = "current_temperature";
    pub const HVAC_ACTION: &str = "hvac_action";
    pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
    pub const FRIENDLY_NAME: &str = "friendly_name";
}

/// Primary value reported when the device exists but has no reading yet.
pub const STATE_UNKNOWN: &str = "unknown";
/// Primary value reported when the device cannot be reached.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// The last known state record of a device: a primary value plus
/// free-form attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub value: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    pub last_updated: Timestamp,
}

impl DeviceState {
    /// Create a record with the given primary value and no attributes.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attributes: BTreeMap::new(),
            last_updated: now(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Whether the primary value carries a real reading.
    #[must_use]
    pub fn is_reporting(&self) -> bool {
        self.value != STATE_UNKNOWN && self.value != STATE_UNAVAILABLE
    }

    /// Parse the primary value as a number.
    ///
    /// Returns `None` for `unknown`/`unavailable` and for values that do not
    /// parse, never an error.
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        if !self.is_reporting() {
            return None;
        }
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// The unit declared through `unit_of_measurement`, Celsius by default.
    #[must_use]
    pub fn temperature_unit(&self) -> TemperatureUnit {
        match self.attribute(attr::UNIT_OF_MEASUREMENT) {
            Some(AttributeValue::String(unit)) => TemperatureUnit::parse(unit),
            _ => TemperatureUnit::Celsius,
        }
    }

    #[must_use]
    pub fn friendly_name(&self) -> Option<String> {
        self.attribute(attr::FRIENDLY_NAME).map(ToString::to_string)
    }
}

/// Temperature unit declared by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Anything that is not recognisably Fahrenheit is treated as Celsius.
    #[must_use]
    pub fn parse(unit: &str) -> Self {
        match unit.trim().trim_start_matches('\u{b0}') {
            "F" | "f" | "fahrenheit" | "Fahrenheit" => Self::Fahrenheit,
            _ => Self::Celsius,
        }
    }

    /// Convert a reading in this unit to degrees Celsius.
    #[must_use]
    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            Self::Celsius => value,
            Self::Fahrenheit => fahrenheit_to_celsius(value),
        }
    }
}

#[must_use]
pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// A state-change notification from the device feed.
///
/// `old` is `None` the first time a device is observed; `new` is `None`
/// when the device was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub old: Option<DeviceState>,
    pub new: Option<DeviceState>,
}

impl StateChange {
    /// Numbers compare by value, so `21` and `21.0` are the same setpoint.
    #[allow(clippy::float_cmp)]
    fn attribute_changed(&self, name: &str) -> bool {
        let before = self.old.as_ref().and_then(|s| s.attribute(name));
        let after = self.new.as_ref().and_then(|s| s.attribute(name));
        match (before, after) {
            (
                Some(a @ (AttributeValue::Int(_) | AttributeValue::Float(_))),
                Some(b @ (AttributeValue::Int(_) | AttributeValue::Float(_))),
            ) => a.as_f64() != b.as_f64(),
            _ => before != after,
        }
    }

    /// The new setpoint when this change moved the target-temperature
    /// attribute of an already-known device to a numeric value.
    #[must_use]
    pub fn target_temperature_change(&self) -> Option<f64> {
        self.old.as_ref()?;
        if !self.attribute_changed(attr::TARGET_TEMPERATURE) {
            return None;
        }
        self.new
            .as_ref()?
            .attribute(attr::TARGET_TEMPERATURE)?
            .as_f64()
            .filter(|v| v.is_finite())
    }

    /// Whether the change is worth a (coalesced) read-model refresh.
    #[must_use]
    pub fn should_refresh(&self) -> bool {
        let Some(new) = &self.new else {
            return false;
        };
        let Some(old) = &self.old else {
            return true;
        };
        old.value != new.value
            || self.attribute_changed(attr::CURRENT_TEMPERATURE)
            || self.attribute_changed(attr::HVAC_ACTION)
    }
}
