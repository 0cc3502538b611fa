//! MQTT integration configuration.

use serde::Deserialize;

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether the daemon starts the bridge at all.
    pub enabled: bool,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Prefix of the default device topic `<base_topic>/<device_id>`.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Pause after a connection error before polling again, in seconds.
    pub reconnect_delay_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "thermohub".to_string(),
            base_topic: "thermohub".to_string(),
            keep_alive_secs: 30,
            reconnect_delay_secs: 2,
        }
    }
}

impl MqttConfig {
    /// Topic used for a device that has no explicit topic assigned.
    #[must_use]
    pub fn default_topic(&self, device_id: &str) -> String {
        format!("{}/{device_id}", self.base_topic.trim_end_matches('/'))
    }
}
