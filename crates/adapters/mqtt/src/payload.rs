//! Decoding of device state payloads.
//!
//! Two shapes are accepted:
//! - a JSON object: the optional `state` key is the primary value, every
//!   other key becomes an attribute;
//! - anything else: the trimmed text is the primary value.

use std::collections::BTreeMap;

use serde_json::Value;

use thermohub_domain::device::{AttributeValue, DeviceState, STATE_UNKNOWN};
use thermohub_domain::time::now;

use crate::error::MqttError;

const STATE_KEY: &str = "state";

/// A decoded payload, before it is merged with the previous device state.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Primary value, if the payload carried one.
    pub value: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Payload {
    /// Build the new state record. A payload without a primary value keeps
    /// the previous one.
    #[must_use]
    pub fn into_state(self, previous: Option<&DeviceState>) -> DeviceState {
        let value = self
            .value
            .or_else(|| previous.map(|state| state.value.clone()))
            .unwrap_or_else(|| STATE_UNKNOWN.to_string());
        DeviceState {
            value,
            attributes: self.attributes,
            last_updated: now(),
        }
    }
}

fn primary_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("on".to_string()),
        Value::Bool(false) => Some("off".to_string()),
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Decode a raw MQTT payload.
///
/// # Errors
///
/// Returns [`MqttError::Encoding`] for non UTF-8 payloads and
/// [`MqttError::PayloadParse`] for malformed JSON objects.
pub fn parse(payload: &[u8]) -> Result<Payload, MqttError> {
    let text = std::str::from_utf8(payload)
        .map_err(MqttError::Encoding)?
        .trim();

    if !text.starts_with('{') {
        return Ok(Payload {
            value: Some(text.to_string()),
            attributes: BTreeMap::new(),
        });
    }

    let mut object: serde_json::Map<String, Value> =
        serde_json::from_str(text).map_err(MqttError::PayloadParse)?;
    let value = object.remove(STATE_KEY).and_then(primary_value);
    let attributes = object
        .into_iter()
        .map(|(key, value)| {
            serde_json::from_value::<AttributeValue>(value).map(|value| (key, value))
        })
        .collect::<Result<_, _>>()
        .map_err(MqttError::PayloadParse)?;

    Ok(Payload { value, attributes })
}
