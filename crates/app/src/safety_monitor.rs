//! Safety monitor — emergency heating shutdown on hazard alarms.
//!
//! The configured hazard sensors are OR-combined: the first sensor to raise
//! its alarm disables every enabled zone and raises the store's sticky
//! safety latch. Sensors clearing never lifts the latch; only
//! [`SafetyMonitor::reset`] does, and it leaves the zones disabled.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thermohub_domain::device::StateChange;
use thermohub_domain::error::ThermoError;
use thermohub_domain::event::{Event, EventType};
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::DeviceId;

use crate::listener::Listener;
use crate::lock;
use crate::ports::{DeviceStateFeed, EventPublisher, RefreshPort, ZoneStore};

/// Observable state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    Normal,
    /// A shutdown ran and has not been reset yet.
    ShutdownActive,
}

/// Result of evaluating every monitored sensor once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Sensors currently signalling danger, in configuration order.
    pub alarms: Vec<DeviceId>,
    /// Sensors without any known state. They neither raise nor clear the
    /// alert.
    pub missing: Vec<DeviceId>,
}

impl Evaluation {
    #[must_use]
    pub fn is_alert(&self) -> bool {
        !self.alarms.is_empty()
    }
}

/// Watches hazard sensors and shuts the heating down on alarm.
pub struct SafetyMonitor<S, F, P, R> {
    inner: Arc<Inner<S, F, P, R>>,
}

impl<S, F, P, R> Clone for SafetyMonitor<S, F, P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, F, P, R> {
    store: S,
    feed: F,
    publisher: P,
    refresh: Option<R>,
    shutdown_active: AtomicBool,
    sensors: Mutex<Vec<HazardSensorConfig>>,
    listener: Mutex<Option<Listener>>,
}

impl<S, F, P, R> SafetyMonitor<S, F, P, R>
where
    S: ZoneStore + 'static,
    F: DeviceStateFeed + 'static,
    P: EventPublisher + 'static,
    R: RefreshPort + 'static,
{
    /// Create a monitor. A latch persisted by an earlier run re-arms the
    /// shutdown guard, so a still-ringing sensor does not shut down twice.
    pub fn new(store: S, feed: F, publisher: P, refresh: Option<R>) -> Self {
        let shutdown_active = store.safety_alert();
        if shutdown_active {
            tracing::warn!("safety shutdown still active from a previous run");
        }
        Self {
            inner: Arc::new(Inner {
                store,
                feed,
                publisher,
                refresh,
                shutdown_active: AtomicBool::new(shutdown_active),
                sensors: Mutex::new(Vec::new()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Load the hazard sensors from the store and start monitoring them.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the sensors cannot be read.
    pub async fn setup(&self) -> Result<SafetyState, ThermoError> {
        let sensors = self.inner.store.hazard_sensors()?;
        Ok(self.reconfigure(sensors).await)
    }

    /// Replace the monitored sensors and evaluate them once.
    ///
    /// Disabled and invalid configurations are ignored. Calling this twice
    /// with the same sensors yields the same subscription.
    #[tracing::instrument(skip_all, fields(configured = sensors.len()))]
    pub async fn reconfigure(&self, sensors: Vec<HazardSensorConfig>) -> SafetyState {
        let enabled: Vec<HazardSensorConfig> = sensors
            .into_iter()
            .filter(|sensor| sensor.enabled)
            .filter(|sensor| match sensor.validate() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(sensor_id = %sensor.sensor_id, error = %err, "ignoring invalid hazard sensor");
                    false
                }
            })
            .collect();
        let ids: BTreeSet<DeviceId> = enabled.iter().map(|s| s.sensor_id.clone()).collect();
        let count = ids.len();
        *lock(&self.inner.sensors) = enabled;

        let weak = Arc::downgrade(&self.inner);
        let listener = Listener::spawn(&self.inner.feed, ids, move |_: StateChange| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    SafetyMonitor { inner }.check().await;
                }
            }
        });
        // the previous subscription is aborted when replaced
        *lock(&self.inner.listener) = Some(listener);

        tracing::info!(sensors = count, "monitoring hazard sensors");
        self.check().await
    }

    /// Evaluate every monitored sensor without acting on the result.
    #[must_use]
    pub fn evaluate(&self) -> Evaluation {
        let sensors = lock(&self.inner.sensors).clone();
        let mut evaluation = Evaluation::default();
        for sensor in sensors {
            match self.inner.feed.current_state(&sensor.sensor_id) {
                None => evaluation.missing.push(sensor.sensor_id),
                Some(state) if sensor.is_alarm(&state) => evaluation.alarms.push(sensor.sensor_id),
                Some(_) => {}
            }
        }
        evaluation
    }

    /// Evaluate the sensors and shut down on the first alarm.
    pub async fn check(&self) -> SafetyState {
        let evaluation = self.evaluate();
        for sensor_id in &evaluation.missing {
            // fail-open: an unreachable sensor cannot raise the alarm
            tracing::warn!(%sensor_id, "hazard sensor has no state, skipping");
        }

        match evaluation.alarms.first() {
            Some(sensor_id) => {
                self.trigger_shutdown(sensor_id).await;
            }
            None if self.state() == SafetyState::ShutdownActive => {
                tracing::info!("hazard alerts cleared, shutdown remains active");
            }
            None => {}
        }
        self.state()
    }

    /// Run the shutdown procedure unless it already ran.
    ///
    /// Returns `true` when this call performed the transition.
    pub async fn trigger_shutdown(&self, sensor_id: &DeviceId) -> bool {
        if self
            .inner
            .shutdown_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(%sensor_id, "safety shutdown already active");
            return false;
        }

        // detached: dropping or replacing the listener must not cut the
        // procedure short once the guard is taken
        let monitor = self.clone();
        let sensor_id = sensor_id.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = monitor.shutdown(&sensor_id).await {
                tracing::error!(%sensor_id, error = %err, "safety shutdown incomplete");
            }
        });
        if let Err(err) = task.await {
            tracing::error!(error = %err, "safety shutdown task failed");
        }
        true
    }

    #[tracing::instrument(skip(self))]
    async fn shutdown(&self, sensor_id: &DeviceId) -> Result<usize, ThermoError> {
        tracing::warn!(%sensor_id, "hazard detected, shutting down heating");

        let mut disabled = 0;
        let listed = match self.inner.store.zones() {
            Ok(zones) => {
                for zone in zones.iter().filter(|zone| zone.enabled) {
                    match self.inner.store.disable(&zone.id) {
                        Ok(true) => disabled += 1,
                        Ok(false) => {}
                        Err(err) => {
                            tracing::error!(%sensor_id, zone_id = %zone.id, error = %err, "failed to disable zone");
                        }
                    }
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(%sensor_id, error = %err, "failed to list zones to disable");
                Err(err)
            }
        };
        // the latch is raised even when no zone could be disabled
        self.inner.store.set_safety_alert(true);

        let persisted = self.inner.store.persist().await;
        if let Err(err) = &persisted {
            tracing::error!(%sensor_id, disabled, error = %err, "failed to persist safety shutdown");
        }

        let event = Event::new(
            EventType::SafetyShutdown,
            None,
            serde_json::json!({
                "sensor_id": sensor_id,
                "zones_disabled": disabled,
            }),
        );
        if let Err(err) = self.inner.publisher.publish(event).await {
            tracing::warn!(%sensor_id, error = %err, "failed to publish safety shutdown event");
        }

        if let Some(refresh) = &self.inner.refresh {
            refresh.request_immediate_refresh();
        }

        tracing::warn!(%sensor_id, disabled, "safety shutdown complete");
        listed.and(persisted).map(|()| disabled)
    }

    /// Clear the latch after the hazard has been dealt with.
    ///
    /// Zones stay disabled; re-enabling them is left to the user. Returns
    /// `false` when no shutdown was active.
    ///
    /// # Errors
    ///
    /// Returns a storage error if persisting the cleared latch fails.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self) -> Result<bool, ThermoError> {
        let was_active = self.inner.shutdown_active.swap(false, Ordering::AcqRel);
        if !was_active && !self.inner.store.safety_alert() {
            return Ok(false);
        }

        self.inner.store.set_safety_alert(false);
        self.inner.store.persist().await?;
        tracing::info!("safety shutdown reset");

        let event = Event::new(EventType::SafetyReset, None, serde_json::Value::Null);
        if let Err(err) = self.inner.publisher.publish(event).await {
            tracing::warn!(error = %err, "failed to publish safety reset event");
        }
        if let Some(refresh) = &self.inner.refresh {
            refresh.request_immediate_refresh();
        }
        Ok(true)
    }

    #[must_use]
    pub fn state(&self) -> SafetyState {
        if self.inner.shutdown_active.load(Ordering::Acquire) {
            SafetyState::ShutdownActive
        } else {
            SafetyState::Normal
        }
    }

    /// Sensors covered by the current subscription.
    #[must_use]
    pub fn subscribed_sensors(&self) -> BTreeSet<DeviceId> {
        lock(&self.inner.listener)
            .as_ref()
            .map(|listener| listener.devices().clone())
            .unwrap_or_default()
    }

    /// Stop monitoring. The latch is left as it is.
    pub fn teardown(&self) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.cancel();
        }
        tracing::info!("safety monitor stopped");
    }
}
