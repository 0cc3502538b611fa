//! Device state coordinator — reconciles live device states with the zones.
//!
//! The coordinator listens to every device assigned to a zone and sorts each
//! change into one of two paths:
//!
//! - **refresh path**: the primary value, measured temperature or HVAC
//!   action moved, so the read model is stale; a coalesced refresh is
//!   requested.
//! - **debounce path**: the device setpoint moved. After the setpoint has
//!   settled for [`CoordinatorConfig::debounce`] it is compared with the
//!   zone's effective target and classified as an echo of our own write, a
//!   stale notification, or a manual override that the zone adopts.
//!
//! At most one debounce is pending per device; a newer setpoint cancels the
//! older one before it can apply. A resolution that already fired runs to
//! completion.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use thermohub_domain::device::StateChange;
use thermohub_domain::error::ThermoError;
use thermohub_domain::event::{Event, EventType};
use thermohub_domain::id::{DeviceId, ZoneId};
use thermohub_domain::manual_override::{TargetChange, classify};
use thermohub_domain::snapshot::{DeviceSnapshot, Snapshot, ZoneSnapshot};
use thermohub_domain::time::now;
use thermohub_domain::zone::Zone;

use crate::config::CoordinatorConfig;
use crate::error::UpdateFailed;
use crate::listener::Listener;
use crate::lock;
use crate::ports::{DeviceStateFeed, EventPublisher, RefreshPort, TargetResolver, ZoneStore};
use crate::refresh_scheduler::SnapshotSource;

/// Reconciles device state changes with zone state and builds snapshots.
///
/// Cheap to clone; clones share the same pending-debounce table.
pub struct Coordinator<S, F, T, R, P> {
    inner: Arc<Inner<S, F, T, R, P>>,
}

impl<S, F, T, R, P> Clone for Coordinator<S, F, T, R, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, F, T, R, P> {
    store: S,
    feed: F,
    resolver: T,
    refresh: R,
    publisher: P,
    config: CoordinatorConfig,
    pending: Mutex<HashMap<DeviceId, PendingDebounce>>,
    next_generation: AtomicU64,
    listener: Mutex<Option<Listener>>,
}

/// A scheduled setpoint resolution for one device.
struct PendingDebounce {
    generation: u64,
    /// Set once the delay elapsed and the resolution started.
    firing: bool,
    handle: JoinHandle<()>,
}

impl PendingDebounce {
    /// Abort the task unless its resolution already started.
    fn cancel(self, device_id: &DeviceId) {
        if self.firing {
            tracing::debug!(%device_id, "setpoint debounce already resolving, letting it finish");
        } else {
            self.handle.abort();
        }
    }
}

/// What happened to a debounced setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// The device is no longer assigned to any zone.
    ZoneNotFound,
    Classified(TargetChange),
}

impl<S, F, T, R, P> Coordinator<S, F, T, R, P>
where
    S: ZoneStore + 'static,
    F: DeviceStateFeed + 'static,
    T: TargetResolver + 'static,
    R: RefreshPort + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(
        store: S,
        feed: F,
        resolver: T,
        refresh: R,
        publisher: P,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                feed,
                resolver,
                refresh,
                publisher,
                config,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to every device currently assigned to a zone, then request
    /// an immediate refresh.
    ///
    /// Devices assigned later are only tracked after `setup` runs again;
    /// calling it again replaces the previous subscription.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the zones cannot be listed.
    #[tracing::instrument(skip(self))]
    pub fn setup(&self) -> Result<usize, ThermoError> {
        let devices: BTreeSet<DeviceId> = self
            .inner
            .store
            .zones()?
            .iter()
            .flat_map(|zone| zone.device_ids().cloned())
            .collect();
        let count = devices.len();

        let weak = Arc::downgrade(&self.inner);
        let listener = Listener::spawn(&self.inner.feed, devices, move |change: StateChange| {
            if let Some(inner) = weak.upgrade() {
                Coordinator { inner }.on_state_change(&change);
            }
            std::future::ready(())
        });
        *lock(&self.inner.listener) = Some(listener);

        tracing::info!(devices = count, "coordinator tracking device states");
        self.inner.refresh.request_immediate_refresh();
        Ok(count)
    }

    /// Classify a state change. Never blocks; follow-up work is spawned.
    pub fn on_state_change(&self, change: &StateChange) {
        if change.new.is_none() {
            tracing::trace!(device_id = %change.device_id, "device has no new state, ignoring");
            return;
        }

        if let Some(target) = change.target_temperature_change() {
            self.schedule_debounce(change.device_id.clone(), target);
            return;
        }

        if change.should_refresh() {
            tracing::trace!(device_id = %change.device_id, "device state moved, requesting refresh");
            self.inner.refresh.request_refresh();
        }
    }

    fn schedule_debounce(&self, device_id: DeviceId, target: f64) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.inner.config.debounce;
        let weak = Arc::downgrade(&self.inner);
        let task_device = device_id.clone();

        // spawn and insert under the table lock so the new task cannot
        // observe the table before its own entry is in place
        let replaced = {
            let mut pending = lock(&self.inner.pending);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(inner) = weak.upgrade() {
                    inner.run_debounce(&task_device, target, generation).await;
                }
            });
            pending.insert(
                device_id.clone(),
                PendingDebounce {
                    generation,
                    firing: false,
                    handle,
                },
            )
        };

        if let Some(previous) = replaced {
            tracing::debug!(%device_id, "superseded pending setpoint debounce");
            previous.cancel(&device_id);
        }
        tracing::debug!(%device_id, target, "setpoint change debounced");
    }

    /// Assemble a fresh snapshot of every zone and its devices.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateFailed`] when the zones cannot be read or a stored
    /// zone violates its invariants. Unparseable device readings only null
    /// the affected field.
    #[tracing::instrument(skip(self))]
    pub fn build_snapshot(&self) -> Result<Snapshot, UpdateFailed> {
        let zones = self.inner.store.zones().map_err(|source| {
            tracing::error!(error = %source, "failed to list zones for snapshot");
            UpdateFailed::new(None, source)
        })?;

        let mut snapshot_zones = BTreeMap::new();
        for zone in zones {
            if let Err(source) = zone.validate() {
                tracing::error!(zone_id = %zone.id, error = %source, "stored zone is invalid");
                return Err(UpdateFailed::new(Some(zone.id), source));
            }
            let devices = zone
                .devices
                .iter()
                .map(|(id, assignment)| {
                    let state = self.inner.feed.current_state(id);
                    DeviceSnapshot::capture(id, assignment, state.as_ref())
                })
                .collect();
            snapshot_zones.insert(zone.id.clone(), ZoneSnapshot::capture(&zone, devices));
        }

        Ok(Snapshot {
            zones: snapshot_zones,
            safety_alert: self.inner.store.safety_alert(),
            generated_at: now(),
        })
    }

    /// Hand a zone back to its schedule after a manual override.
    ///
    /// Returns `false` when no override was active.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::NotFound`] for an unknown zone, or a storage
    /// error if persisting fails.
    #[tracing::instrument(skip(self))]
    pub async fn clear_manual_override(&self, zone_id: &ZoneId) -> Result<bool, ThermoError> {
        let mut cleared = false;
        self.inner
            .store
            .update_zone(zone_id, |zone| cleared = zone.clear_manual_override())?;
        if cleared {
            self.inner.store.persist().await?;
            tracing::info!(%zone_id, "manual override cleared");
            self.inner.refresh.request_immediate_refresh();
        }
        Ok(cleared)
    }

    /// Unsubscribe and cancel every pending debounce.
    pub fn teardown(&self) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.cancel();
        }
        let drained: Vec<_> = lock(&self.inner.pending).drain().collect();
        for (device_id, entry) in drained {
            tracing::debug!(%device_id, "cancelled pending setpoint debounce");
            entry.cancel(&device_id);
        }
        tracing::info!("coordinator stopped");
    }

    /// Number of devices with a debounce in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    #[must_use]
    pub fn has_pending(&self, device_id: &DeviceId) -> bool {
        lock(&self.inner.pending).contains_key(device_id)
    }

    /// Devices covered by the current subscription.
    #[must_use]
    pub fn tracked_devices(&self) -> BTreeSet<DeviceId> {
        lock(&self.inner.listener)
            .as_ref()
            .map(|listener| listener.devices().clone())
            .unwrap_or_default()
    }
}

impl<S, F, T, R, P> SnapshotSource for Coordinator<S, F, T, R, P>
where
    S: ZoneStore + 'static,
    F: DeviceStateFeed + 'static,
    T: TargetResolver + 'static,
    R: RefreshPort + 'static,
    P: EventPublisher + 'static,
{
    fn build_snapshot(&self) -> Result<Snapshot, UpdateFailed> {
        Coordinator::build_snapshot(self)
    }
}

impl<S, F, T, R, P> Inner<S, F, T, R, P>
where
    S: ZoneStore,
    T: TargetResolver,
    R: RefreshPort,
    P: EventPublisher,
{
    async fn run_debounce(&self, device_id: &DeviceId, actual: f64, generation: u64) {
        let _cleanup = PendingCleanup {
            pending: &self.pending,
            device_id,
            generation,
        };
        if !self.begin_firing(device_id, generation) {
            tracing::trace!(%device_id, actual, "setpoint debounce superseded");
            return;
        }
        match self.resolve(device_id, actual).await {
            Ok(resolution) => {
                tracing::trace!(%device_id, actual, ?resolution, "setpoint debounce resolved");
            }
            Err(err) => {
                tracing::error!(%device_id, actual, error = %err, "failed to resolve setpoint change");
            }
        }
    }

    /// Mark the entry of `generation` as firing. Returns `false` when a
    /// newer setpoint or a teardown replaced it.
    fn begin_firing(&self, device_id: &DeviceId, generation: u64) -> bool {
        match lock(&self.pending).get_mut(device_id) {
            Some(entry) if entry.generation == generation => {
                entry.firing = true;
                true
            }
            _ => false,
        }
    }

    async fn resolve(&self, device_id: &DeviceId, actual: f64) -> Result<Resolution, ThermoError> {
        let Some(zone) = self.store.zone_for_device(device_id)? else {
            tracing::debug!(%device_id, "debounced device no longer belongs to a zone");
            return Ok(Resolution::ZoneNotFound);
        };

        let expected = self.resolver.effective_target(&zone);
        let change = classify(actual, expected, self.config.tolerance);
        match change {
            TargetChange::Echo => {
                tracing::debug!(zone_id = %zone.id, %device_id, expected, actual, "setpoint echo");
            }
            TargetChange::Stale => {
                tracing::debug!(
                    zone_id = %zone.id,
                    %device_id,
                    expected,
                    actual,
                    "setpoint below expected target, ignoring stale update"
                );
            }
            TargetChange::ManualOverride => {
                match self.apply_override(&zone, device_id, expected, actual).await {
                    Err(ThermoError::NotFound(_)) => {
                        tracing::debug!(zone_id = %zone.id, %device_id, "zone removed during override");
                        return Ok(Resolution::ZoneNotFound);
                    }
                    other => other?,
                }
            }
        }
        Ok(Resolution::Classified(change))
    }

    async fn apply_override(
        &self,
        zone: &Zone,
        device_id: &DeviceId,
        expected: f64,
        actual: f64,
    ) -> Result<(), ThermoError> {
        let log_failure = |err: &ThermoError| {
            tracing::error!(
                zone_id = %zone.id,
                %device_id,
                expected,
                actual,
                error = %err,
                "failed to apply manual override"
            );
        };

        self.store
            .update_zone(&zone.id, |zone| zone.apply_manual_override(actual))
            .inspect_err(log_failure)?;
        self.store.persist().await.inspect_err(log_failure)?;

        tracing::info!(zone_id = %zone.id, %device_id, expected, actual, "manual override detected");

        let event = Event::new(
            EventType::ManualOverrideDetected,
            Some(zone.id.clone()),
            serde_json::json!({
                "device_id": device_id,
                "expected": expected,
                "target_temperature": actual,
            }),
        );
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(zone_id = %zone.id, error = %err, "failed to publish override event");
        }

        self.refresh.request_immediate_refresh();
        Ok(())
    }
}

/// Removes the pending entry of a debounce once it resolves or is dropped
/// mid-resolution, unless a newer entry already took its place.
struct PendingCleanup<'a> {
    pending: &'a Mutex<HashMap<DeviceId, PendingDebounce>>,
    device_id: &'a DeviceId,
    generation: u64,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        let mut pending = lock(self.pending);
        if pending
            .get(self.device_id)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            pending.remove(self.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use thermohub_domain::device::{DeviceState, DeviceType, STATE_UNAVAILABLE, attr};
    use thermohub_domain::snapshot::DeviceReading;

    use crate::ports::ZoneTargetResolver;
    use crate::state_registry::StateRegistry;
    use crate::test_support::{InMemoryZoneStore, SpyPublisher, SpyRefresh};

    const TRV: &str = "climate.living_trv";

    type TestCoordinator<T> = Coordinator<
        Arc<InMemoryZoneStore>,
        Arc<StateRegistry>,
        T,
        Arc<SpyRefresh>,
        Arc<SpyPublisher>,
    >;

    struct Harness<T> {
        coordinator: TestCoordinator<T>,
        store: Arc<InMemoryZoneStore>,
        registry: Arc<StateRegistry>,
        refresh: Arc<SpyRefresh>,
        publisher: Arc<SpyPublisher>,
    }

    fn living_room(target: f64) -> Zone {
        Zone::builder()
            .id("living_room")
            .name("Living Room")
            .target_temperature(target)
            .device(TRV, DeviceType::Thermostat)
            .device("sensor.living_temp", DeviceType::TemperatureSensor)
            .device("valve.living", DeviceType::Valve)
            .build()
            .unwrap()
    }

    fn harness_with<T: TargetResolver + 'static>(zones: Vec<Zone>, resolver: T) -> Harness<T> {
        harness_on(InMemoryZoneStore::with(zones), resolver)
    }

    fn harness_on<T: TargetResolver + 'static>(store: InMemoryZoneStore, resolver: T) -> Harness<T> {
        let store = Arc::new(store);
        let registry = Arc::new(StateRegistry::new(64));
        let refresh = Arc::new(SpyRefresh::default());
        let publisher = Arc::new(SpyPublisher::default());
        let coordinator = Coordinator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            resolver,
            Arc::clone(&refresh),
            Arc::clone(&publisher),
            CoordinatorConfig::default(),
        );
        Harness {
            coordinator,
            store,
            registry,
            refresh,
            publisher,
        }
    }

    fn harness(target: f64) -> Harness<ZoneTargetResolver> {
        harness_with(vec![living_room(target)], ZoneTargetResolver)
    }

    fn slow_persist_harness(target: f64) -> Harness<ZoneTargetResolver> {
        let store = InMemoryZoneStore::with(vec![living_room(target)])
            .with_persist_delay(Duration::from_millis(500));
        harness_on(store, ZoneTargetResolver)
    }

    fn thermostat(target: f64) -> DeviceState {
        DeviceState::new("heat")
            .with_attribute(attr::TARGET_TEMPERATURE, target)
            .with_attribute(attr::CURRENT_TEMPERATURE, 19.0)
    }

    fn setpoint_change(device: &str, from: f64, to: f64) -> StateChange {
        StateChange {
            device_id: DeviceId::from(device),
            old: Some(thermostat(from)),
            new: Some(thermostat(to)),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_track_every_assigned_device_on_setup() {
        let kitchen = Zone::builder()
            .id("kitchen")
            .name("Kitchen")
            .device("climate.kitchen", DeviceType::Thermostat)
            .build()
            .unwrap();
        let h = harness_with(vec![living_room(21.0), kitchen], ZoneTargetResolver);

        let count = h.coordinator.setup().unwrap();

        assert_eq!(count, 4);
        assert!(h.coordinator.tracked_devices().contains(&DeviceId::from("climate.kitchen")));
        assert_eq!(h.refresh.immediate(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_change_without_new_state() {
        let h = harness(21.0);
        h.coordinator.on_state_change(&StateChange {
            device_id: DeviceId::from(TRV),
            old: Some(thermostat(21.0)),
            new: None,
        });
        assert_eq!(h.coordinator.pending_count(), 0);
        assert_eq!(h.refresh.coalesced(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_exactly_one_pending_entry_per_device() {
        let h = harness(20.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 22.0));
        assert_eq!(h.coordinator.pending_count(), 1);

        h.coordinator.on_state_change(&setpoint_change(TRV, 22.0, 23.0));
        assert_eq!(h.coordinator.pending_count(), 1);
        assert!(h.coordinator.has_pending(&DeviceId::from(TRV)));

        settle().await;

        let zone = h.store.get("living_room");
        assert!(zone.manual_override);
        assert!((zone.target_temperature - 23.0).abs() < f64::EPSILON);
        assert_eq!(h.store.persist_count(), 1);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_apply_cancelled_debounce() {
        let h = harness(21.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 21.0, 24.0));
        h.coordinator.on_state_change(&setpoint_change(TRV, 24.0, 21.0));
        settle().await;

        let zone = h.store.get("living_room");
        assert!(!zone.manual_override);
        assert!((zone.target_temperature - 21.0).abs() < f64::EPSILON);
        assert_eq!(h.store.persist_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_finish_resolving_override_when_superseded() {
        let h = slow_persist_harness(20.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 22.0));
        // debounce elapsed, the override is being persisted
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        h.coordinator.on_state_change(&setpoint_change(TRV, 22.0, 22.02));
        settle().await;

        let zone = h.store.get("living_room");
        assert!(zone.manual_override);
        assert!((zone.target_temperature - 22.0).abs() < f64::EPSILON);
        assert_eq!(h.store.persist_count(), 1);
        assert_eq!(h.refresh.immediate(), 1);
        assert_eq!(h.publisher.events_of(EventType::ManualOverrideDetected).len(), 1);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_finish_resolving_override_on_teardown() {
        let h = slow_persist_harness(20.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 22.0));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        h.coordinator.teardown();
        settle().await;

        assert!(h.store.get("living_room").manual_override);
        assert_eq!(h.store.persist_count(), 1);
        assert_eq!(h.refresh.immediate(), 1);
        assert_eq!(h.publisher.events_of(EventType::ManualOverrideDetected).len(), 1);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_refresh_immediately_for_setpoint_change() {
        let h = harness(21.0);
        h.coordinator.on_state_change(&setpoint_change(TRV, 21.0, 21.05));
        assert_eq!(h.refresh.coalesced(), 0);
        assert_eq!(h.refresh.immediate(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_treat_setpoint_within_tolerance_as_echo() {
        let h = harness(21.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 21.05));
        settle().await;

        let zone = h.store.get("living_room");
        assert!(!zone.manual_override);
        assert!((zone.target_temperature - 21.0).abs() < f64::EPSILON);
        assert_eq!(h.store.persist_count(), 0);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_stale_lower_setpoint() {
        for stale in [20.5, 19.0] {
            let h = harness(21.0);

            h.coordinator.on_state_change(&setpoint_change(TRV, 22.0, stale));
            settle().await;

            let zone = h.store.get("living_room");
            assert!(!zone.manual_override, "stale value {stale} triggered override");
            assert!((zone.target_temperature - 21.0).abs() < f64::EPSILON);
            assert_eq!(h.store.persist_count(), 0);
            assert_eq!(h.refresh.immediate(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_adopt_higher_setpoint_as_manual_override() {
        let h = harness(20.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 22.0));
        settle().await;

        let zone = h.store.get("living_room");
        assert!(zone.manual_override);
        assert!((zone.target_temperature - 22.0).abs() < f64::EPSILON);
        assert_eq!(h.store.persist_count(), 1);
        assert_eq!(h.refresh.immediate(), 1);
        assert_eq!(h.refresh.coalesced(), 0);

        let events = h.publisher.events_of(EventType::ManualOverrideDetected);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].zone_id, Some(ZoneId::from("living_room")));
        assert_eq!(events[0].data["target_temperature"], 22.0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_compare_against_effective_target() {
        // a boost raised the effective target to 23 while the stored target is 20
        let h = harness_with(vec![living_room(20.0)], |_: &Zone| 23.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 23.0));
        settle().await;

        assert!(!h.store.get("living_room").manual_override);
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_debounce_for_device_without_zone() {
        let h = harness(20.0);

        h.coordinator
            .on_state_change(&setpoint_change("climate.orphan", 20.0, 25.0));
        settle().await;

        assert_eq!(h.coordinator.pending_count(), 0);
        assert_eq!(h.store.persist_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_debounce_when_zone_removed_mid_flight() {
        let h = harness(20.0);

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 25.0));
        h.store.remove_zone(&ZoneId::from("living_room"));
        settle().await;

        assert_eq!(h.coordinator.pending_count(), 0);
        assert_eq!(h.store.persist_count(), 0);
        assert_eq!(h.refresh.immediate(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_request_coalesced_refresh_for_measurement_change() {
        let h = harness(21.0);
        let old = thermostat(21.0);
        let new = thermostat(21.0).with_attribute(attr::CURRENT_TEMPERATURE, 19.5);

        h.coordinator.on_state_change(&StateChange {
            device_id: DeviceId::from(TRV),
            old: Some(old),
            new: Some(new),
        });

        assert_eq!(h.refresh.coalesced(), 1);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_refresh_for_irrelevant_change() {
        let h = harness(21.0);
        h.coordinator.on_state_change(&StateChange {
            device_id: DeviceId::from(TRV),
            old: Some(thermostat(21.0).with_attribute("battery", 90.0)),
            new: Some(thermostat(21.0).with_attribute("battery", 89.0)),
        });
        assert_eq!(h.refresh.coalesced(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_cancel_pending_debounce_on_teardown() {
        let h = harness(20.0);
        h.coordinator.setup().unwrap();

        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 25.0));
        h.coordinator.teardown();
        settle().await;

        assert_eq!(h.coordinator.pending_count(), 0);
        assert!(!h.store.get("living_room").manual_override);
        assert!(h.coordinator.tracked_devices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_reconcile_changes_arriving_through_the_feed() {
        let h = harness(20.0);
        h.coordinator.setup().unwrap();

        h.registry.set_state(DeviceId::from(TRV), thermostat(20.0));
        h.registry.set_state(DeviceId::from(TRV), thermostat(22.5));
        settle().await;

        let zone = h.store.get("living_room");
        assert!(zone.manual_override);
        assert!((zone.target_temperature - 22.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn should_build_snapshot_with_typed_device_records() {
        let h = harness(21.0);
        h.registry.set_state(
            DeviceId::from("sensor.living_temp"),
            DeviceState::new("68").with_attribute(attr::UNIT_OF_MEASUREMENT, "\u{b0}F"),
        );
        h.registry
            .set_state(DeviceId::from(TRV), thermostat(21.0).with_attribute(attr::HVAC_ACTION, "heating"));

        let snapshot = h.coordinator.build_snapshot().unwrap();
        let zone = snapshot.zone(&ZoneId::from("living_room")).unwrap();
        assert_eq!(zone.devices.len(), 3);

        let sensor = zone.device(&DeviceId::from("sensor.living_temp")).unwrap();
        let DeviceReading::TemperatureSensor { temperature: Some(t) } = sensor.reading else {
            panic!("expected a temperature, got {:?}", sensor.reading);
        };
        assert!((t - 20.0).abs() < 0.01);

        let valve = zone.device(&DeviceId::from("valve.living")).unwrap();
        assert_eq!(valve.state, STATE_UNAVAILABLE);
        assert_eq!(valve.reading, DeviceReading::None);

        let trv = zone.device(&DeviceId::from(TRV)).unwrap();
        assert_eq!(trv.state, "heat");
        assert!(!snapshot.safety_alert);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_update_failed_when_store_unreadable() {
        let h = harness(21.0);
        h.store.break_reads();

        let err = h.coordinator.build_snapshot().unwrap_err();
        assert!(err.zone.is_none());
        assert!(matches!(err.source, ThermoError::Storage(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_update_failed_with_zone_context() {
        let h = harness(21.0);
        h.store
            .update_zone(&ZoneId::from("living_room"), |zone| {
                zone.target_temperature = f64::NAN;
            })
            .unwrap();

        let err = h.coordinator.build_snapshot().unwrap_err();
        assert_eq!(err.zone, Some(ZoneId::from("living_room")));
    }

    #[tokio::test(start_paused = true)]
    async fn should_clear_manual_override() {
        let h = harness(20.0);
        h.coordinator.on_state_change(&setpoint_change(TRV, 20.0, 22.0));
        settle().await;

        let cleared = h
            .coordinator
            .clear_manual_override(&ZoneId::from("living_room"))
            .await
            .unwrap();

        assert!(cleared);
        assert!(!h.store.get("living_room").manual_override);
        assert_eq!(h.store.persist_count(), 2);

        let again = h
            .coordinator
            .clear_manual_override(&ZoneId::from("living_room"))
            .await
            .unwrap();
        assert!(!again);
        assert_eq!(h.store.persist_count(), 2);
    }
}
