//! In-memory port fakes shared by the unit tests of this crate.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thermohub_domain::error::ThermoError;
use thermohub_domain::event::{Event, EventType};
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::ZoneId;
use thermohub_domain::zone::Zone;

use crate::ports::zone_store::zone_not_found;
use crate::ports::{EventPublisher, RefreshPort, ZoneStore};

// ── In-memory zone store ───────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryZoneStore {
    zones: Mutex<BTreeMap<ZoneId, Zone>>,
    sensors: Mutex<Vec<HazardSensorConfig>>,
    safety_alert: AtomicBool,
    persists: AtomicUsize,
    persist_delay: Duration,
    broken: AtomicBool,
    broken_listing: AtomicBool,
}

impl InMemoryZoneStore {
    pub fn with(zones: Vec<Zone>) -> Self {
        let store = Self::default();
        {
            let mut map = store.zones.lock().unwrap();
            for zone in zones {
                map.insert(zone.id.clone(), zone);
            }
        }
        store
    }

    pub fn with_sensors(self, sensors: Vec<HazardSensorConfig>) -> Self {
        *self.sensors.lock().unwrap() = sensors;
        self
    }

    /// Make every `persist` take `delay` before it completes.
    pub fn with_persist_delay(mut self, delay: Duration) -> Self {
        self.persist_delay = delay;
        self
    }

    /// Completed persists; a persist cancelled midway is not counted.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Make every read fail with a storage error.
    pub fn break_reads(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Make `zones()` fail while single-zone access keeps working.
    pub fn break_listing(&self) {
        self.broken_listing.store(true, Ordering::SeqCst);
    }

    pub fn remove_zone(&self, id: &ZoneId) {
        self.zones.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Zone {
        self.zones.lock().unwrap()[&ZoneId::from(id)].clone()
    }

    fn check(&self) -> Result<(), ThermoError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ThermoError::Storage(Box::new(std::io::Error::other(
                "store unavailable",
            ))));
        }
        Ok(())
    }
}

impl ZoneStore for InMemoryZoneStore {
    fn zones(&self) -> Result<Vec<Zone>, ThermoError> {
        self.check()?;
        if self.broken_listing.load(Ordering::SeqCst) {
            return Err(ThermoError::Storage(Box::new(std::io::Error::other(
                "zone listing unavailable",
            ))));
        }
        Ok(self.zones.lock().unwrap().values().cloned().collect())
    }

    fn zone(&self, id: &ZoneId) -> Result<Option<Zone>, ThermoError> {
        self.check()?;
        Ok(self.zones.lock().unwrap().get(id).cloned())
    }

    fn update_zone<F>(&self, id: &ZoneId, mutate: F) -> Result<Zone, ThermoError>
    where
        F: FnOnce(&mut Zone),
    {
        let mut zones = self.zones.lock().unwrap();
        let zone = zones.get_mut(id).ok_or_else(|| zone_not_found(id))?;
        mutate(zone);
        Ok(zone.clone())
    }

    fn hazard_sensors(&self) -> Result<Vec<HazardSensorConfig>, ThermoError> {
        self.check()?;
        Ok(self.sensors.lock().unwrap().clone())
    }

    fn safety_alert(&self) -> bool {
        self.safety_alert.load(Ordering::SeqCst)
    }

    fn set_safety_alert(&self, active: bool) {
        self.safety_alert.store(active, Ordering::SeqCst);
    }

    fn persist(&self) -> impl Future<Output = Result<(), ThermoError>> + Send {
        async move {
            if !self.persist_delay.is_zero() {
                tokio::time::sleep(self.persist_delay).await;
            }
            self.persists.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

// ── Spy refresh port ───────────────────────────────────────────────

#[derive(Default)]
pub struct SpyRefresh {
    coalesced: AtomicUsize,
    immediate: AtomicUsize,
}

impl SpyRefresh {
    pub fn coalesced(&self) -> usize {
        self.coalesced.load(Ordering::SeqCst)
    }

    pub fn immediate(&self) -> usize {
        self.immediate.load(Ordering::SeqCst)
    }
}

impl RefreshPort for SpyRefresh {
    fn request_refresh(&self) {
        self.coalesced.fetch_add(1, Ordering::SeqCst);
    }

    fn request_immediate_refresh(&self) {
        self.immediate.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Spy publisher ──────────────────────────────────────────────────

#[derive(Default)]
pub struct SpyPublisher {
    events: Mutex<Vec<Event>>,
}

impl SpyPublisher {
    pub fn events_of(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl EventPublisher for SpyPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ThermoError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}
