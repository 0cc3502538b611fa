//! MQTT adapter error types.

use thermohub_domain::error::ThermoError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The payload is not valid UTF-8.
    #[error("MQTT payload is not UTF-8")]
    Encoding(#[source] std::str::Utf8Error),

    /// Failed to parse an incoming MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),
}

impl From<MqttError> for ThermoError {
    fn from(err: MqttError) -> Self {
        Self::Storage(Box::new(err))
    }
}
