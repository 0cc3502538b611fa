//! Hazard sensors — smoke, carbon monoxide, gas, … detectors whose alarm
//! forces an emergency heating shutdown.

use serde::{Deserialize, Serialize};

use crate::device::{AttributeValue, DeviceState};
use crate::error::{ThermoError, ValidationError};
use crate::id::DeviceId;

/// Attribute name meaning "compare the primary state value".
pub const STATE_ATTRIBUTE: &str = "state";

fn default_attribute() -> String {
    STATE_ATTRIBUTE.to_string()
}

fn default_enabled() -> bool {
    true
}

/// Configuration of a single monitored hazard sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardSensorConfig {
    pub sensor_id: DeviceId,
    /// `"state"` for the primary value, otherwise an attribute name.
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Value signalling danger.
    pub alert_value: AttributeValue,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl HazardSensorConfig {
    /// Watch the primary value of `sensor_id` for `alert_value`.
    #[must_use]
    pub fn new(sensor_id: impl Into<DeviceId>, alert_value: impl Into<AttributeValue>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            attribute: default_attribute(),
            alert_value: alert_value.into(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Validation`] when the sensor id or attribute
    /// name is empty.
    pub fn validate(&self) -> Result<(), ThermoError> {
        if self.sensor_id.as_str().is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        if self.attribute.trim().is_empty() {
            return Err(ValidationError::EmptyAttribute.into());
        }
        Ok(())
    }

    #[must_use]
    pub fn monitors_primary_value(&self) -> bool {
        self.attribute == STATE_ATTRIBUTE
    }

    /// Whether `state` signals danger for this sensor.
    ///
    /// A missing attribute never matches.
    #[must_use]
    pub fn is_alarm(&self, state: &DeviceState) -> bool {
        if self.monitors_primary_value() {
            return self.alert_value.matches_text(&state.value);
        }
        state
            .attribute(&self.attribute)
            .is_some_and(|value| value.matches(&self.alert_value))
    }
}
