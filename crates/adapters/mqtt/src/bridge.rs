//! MQTT bridge — subscribes to device topics and feeds the state registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use thermohub_app::ports::DeviceStateFeed;
use thermohub_app::state_registry::StateRegistry;
use thermohub_domain::device::StateChange;
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::DeviceId;
use thermohub_domain::zone::Zone;

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::payload;

/// Maps MQTT state topics onto device ids.
pub struct MqttBridge {
    config: MqttConfig,
    topics: HashMap<String, DeviceId>,
}

impl MqttBridge {
    /// Route every zone device and hazard sensor to its topic.
    ///
    /// Devices use their assigned topic, or `<base_topic>/<device_id>`.
    /// Hazard sensors always use the default topic.
    #[must_use]
    pub fn new(config: MqttConfig, zones: &[Zone], sensors: &[HazardSensorConfig]) -> Self {
        let mut topics = HashMap::new();
        for zone in zones {
            for (device_id, assignment) in &zone.devices {
                let topic = assignment
                    .topic
                    .clone()
                    .unwrap_or_else(|| config.default_topic(device_id.as_str()));
                topics.insert(topic, device_id.clone());
            }
        }
        for sensor in sensors {
            topics
                .entry(config.default_topic(sensor.sensor_id.as_str()))
                .or_insert_with(|| sensor.sensor_id.clone());
        }
        Self { config, topics }
    }

    #[must_use]
    pub fn device_for(&self, topic: &str) -> Option<&DeviceId> {
        self.topics.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Apply one published message to the registry.
    ///
    /// Returns `Ok(None)` for topics that belong to no known device.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError`] when the payload cannot be decoded.
    pub fn handle_publish(
        &self,
        registry: &StateRegistry,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<StateChange>, MqttError> {
        let Some(device_id) = self.device_for(topic) else {
            tracing::trace!(topic, "ignoring message on unmapped topic");
            return Ok(None);
        };
        let decoded = payload::parse(payload)?;
        let previous = registry.current_state(device_id);
        let state = decoded.into_state(previous.as_ref());
        Ok(Some(registry.set_state(device_id.clone(), state)))
    }

    fn subscribe_all(&self, client: &AsyncClient) -> Result<(), MqttError> {
        for topic in self.topics.keys() {
            client
                .try_subscribe(topic.as_str(), QoS::AtLeastOnce)
                .map_err(MqttError::Client)?;
        }
        tracing::debug!(topics = self.topics.len(), "subscribed to device topics");
        Ok(())
    }

    /// Connect to the broker and pump messages into `registry` until the
    /// returned task is aborted.
    pub fn spawn(self, registry: Arc<StateRegistry>) -> JoinHandle<()> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(self.config.keep_alive_secs)));
        let reconnect_delay = Duration::from_secs(u64::from(self.config.reconnect_delay_secs));
        let (client, mut eventloop) = AsyncClient::new(options, self.topics.len().max(16) * 2);

        tokio::spawn(async move {
            tracing::info!(
                host = %self.config.broker_host,
                port = self.config.broker_port,
                "connecting to MQTT broker"
            );
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("connected to MQTT broker");
                        // the session is clean, subscriptions must be renewed
                        if let Err(err) = self.subscribe_all(&client) {
                            tracing::error!(error = %err, "failed to subscribe to device topics");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Err(err) =
                            self.handle_publish(&registry, &publish.topic, &publish.payload)
                        {
                            tracing::warn!(topic = %publish.topic, error = %err, "dropping MQTT message");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "MQTT connection error, retrying");
                        tokio::time::sleep(reconnect_delay).await;
                    }
                }
            }
        })
    }
}
