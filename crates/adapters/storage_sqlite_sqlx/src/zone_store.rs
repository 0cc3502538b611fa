//! `SQLite` implementation of [`ZoneStore`].
//!
//! The whole model (zones, device assignments, hazard sensors, safety
//! latch) is loaded into memory on open. Reads and mutations work against
//! that copy; [`persist`](ZoneStore::persist) writes it back in a single
//! transaction.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::future::Future;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use tokio::sync::Mutex;

use thermohub_app::ports::ZoneStore;
use thermohub_app::ports::zone_store::zone_not_found;
use thermohub_domain::device::{AttributeValue, DeviceAssignment, DeviceType};
use thermohub_domain::error::ThermoError;
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::{DeviceId, ZoneId};
use thermohub_domain::zone::Zone;

use crate::error::StorageError;

fn decode_error<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

/// Wrapper for converting database rows into domain [`Zone`] (without devices).
struct ZoneWrapper(Zone);

impl<'r> FromRow<'r, SqliteRow> for ZoneWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;

        Ok(Self(Zone {
            id: ZoneId::from_str(&id).map_err(decode_error)?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            target_temperature: row.try_get("target_temperature")?,
            current_temperature: row.try_get("current_temperature")?,
            manual_override: row.try_get("manual_override")?,
            devices: BTreeMap::new(),
        }))
    }
}

/// One row of `zone_devices`.
struct DeviceWrapper {
    zone_id: ZoneId,
    device_id: DeviceId,
    assignment: DeviceAssignment,
}

impl<'r> FromRow<'r, SqliteRow> for DeviceWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let zone_id: String = row.try_get("zone_id")?;
        let device_id: String = row.try_get("device_id")?;
        let device_type: String = row.try_get("device_type")?;
        let topic: Option<String> = row.try_get("topic")?;

        Ok(Self {
            zone_id: ZoneId::from_str(&zone_id).map_err(decode_error)?,
            device_id: DeviceId::from_str(&device_id).map_err(decode_error)?,
            assignment: DeviceAssignment {
                device_type: DeviceType::from(device_type),
                topic,
            },
        })
    }
}

/// Wrapper for converting database rows into domain [`HazardSensorConfig`].
struct SensorWrapper(HazardSensorConfig);

impl<'r> FromRow<'r, SqliteRow> for SensorWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let sensor_id: String = row.try_get("sensor_id")?;
        let alert_value: String = row.try_get("alert_value")?;
        let alert_value: AttributeValue =
            serde_json::from_str(&alert_value).map_err(decode_error)?;

        Ok(Self(HazardSensorConfig {
            sensor_id: DeviceId::from_str(&sensor_id).map_err(decode_error)?,
            attribute: row.try_get("attribute")?,
            alert_value,
            enabled: row.try_get("enabled")?,
        }))
    }
}

const SELECT_ZONES: &str = "SELECT id, name, enabled, target_temperature, current_temperature, manual_override FROM zones ORDER BY id";
const SELECT_DEVICES: &str =
    "SELECT zone_id, device_id, device_type, topic FROM zone_devices ORDER BY zone_id, device_id";
const SELECT_SENSORS: &str =
    "SELECT sensor_id, attribute, alert_value, enabled FROM hazard_sensors ORDER BY position";
const SELECT_SAFETY: &str = "SELECT alert FROM safety_state WHERE id = 1";

const DELETE_DEVICES: &str = "DELETE FROM zone_devices";
const DELETE_ZONES: &str = "DELETE FROM zones";
const DELETE_SENSORS: &str = "DELETE FROM hazard_sensors";

const INSERT_ZONE: &str = "INSERT INTO zones (id, name, enabled, target_temperature, current_temperature, manual_override) VALUES (?, ?, ?, ?, ?, ?)";
const INSERT_DEVICE: &str =
    "INSERT INTO zone_devices (zone_id, device_id, device_type, topic) VALUES (?, ?, ?, ?)";
const INSERT_SENSOR: &str = "INSERT INTO hazard_sensors (sensor_id, attribute, alert_value, enabled, position) VALUES (?, ?, ?, ?, ?)";
const UPSERT_SAFETY: &str = "INSERT INTO safety_state (id, alert) VALUES (1, ?) ON CONFLICT(id) DO UPDATE SET alert = excluded.alert";

#[derive(Debug, Clone, Default)]
struct Model {
    zones: BTreeMap<ZoneId, Zone>,
    sensors: Vec<HazardSensorConfig>,
    safety_alert: bool,
}

async fn load(pool: &SqlitePool) -> Result<Model, StorageError> {
    let rows: Vec<ZoneWrapper> = sqlx::query_as(SELECT_ZONES).fetch_all(pool).await?;
    let mut zones: BTreeMap<ZoneId, Zone> = rows
        .into_iter()
        .map(|w| (w.0.id.clone(), w.0))
        .collect();

    let devices: Vec<DeviceWrapper> = sqlx::query_as(SELECT_DEVICES).fetch_all(pool).await?;
    for device in devices {
        if let Some(zone) = zones.get_mut(&device.zone_id) {
            zone.devices.insert(device.device_id, device.assignment);
        }
    }

    let sensors: Vec<SensorWrapper> = sqlx::query_as(SELECT_SENSORS).fetch_all(pool).await?;
    let safety: Option<(bool,)> = sqlx::query_as(SELECT_SAFETY).fetch_optional(pool).await?;

    Ok(Model {
        zones,
        sensors: sensors.into_iter().map(|w| w.0).collect(),
        safety_alert: safety.is_some_and(|(alert,)| alert),
    })
}

async fn write_all(pool: &SqlitePool, model: &Model) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    sqlx::query(DELETE_DEVICES).execute(&mut *tx).await?;
    sqlx::query(DELETE_ZONES).execute(&mut *tx).await?;
    sqlx::query(DELETE_SENSORS).execute(&mut *tx).await?;

    for zone in model.zones.values() {
        sqlx::query(INSERT_ZONE)
            .bind(zone.id.as_str())
            .bind(&zone.name)
            .bind(zone.enabled)
            .bind(zone.target_temperature)
            .bind(zone.current_temperature)
            .bind(zone.manual_override)
            .execute(&mut *tx)
            .await?;

        for (device_id, assignment) in &zone.devices {
            sqlx::query(INSERT_DEVICE)
                .bind(zone.id.as_str())
                .bind(device_id.as_str())
                .bind(assignment.device_type.as_str())
                .bind(assignment.topic.as_deref())
                .execute(&mut *tx)
                .await?;
        }
    }

    for (position, sensor) in (0_i64..).zip(&model.sensors) {
        sqlx::query(INSERT_SENSOR)
            .bind(sensor.sensor_id.as_str())
            .bind(&sensor.attribute)
            .bind(serde_json::to_string(&sensor.alert_value)?)
            .bind(sensor.enabled)
            .bind(position)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(UPSERT_SAFETY)
        .bind(model.safety_alert)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// `SQLite`-backed zone store.
pub struct SqliteZoneStore {
    pool: SqlitePool,
    model: RwLock<Model>,
    // serialises writers so persisted snapshots land in order
    write: Mutex<()>,
}

impl SqliteZoneStore {
    /// Load the stored model from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if a query fails or a row cannot be decoded.
    pub async fn open(pool: SqlitePool) -> Result<Self, StorageError> {
        let model = load(&pool).await?;
        tracing::info!(
            zones = model.zones.len(),
            sensors = model.sensors.len(),
            safety_alert = model.safety_alert,
            "zone store loaded"
        );
        Ok(Self {
            pool,
            model: RwLock::new(model),
            write: Mutex::new(()),
        })
    }

    /// Add the configured zones and hazard sensors that are not stored yet,
    /// then persist. Stored entries win over the configuration.
    ///
    /// Returns the number of entries added.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Validation`] for an invalid entry, or a
    /// storage error if persisting fails.
    pub async fn seed(
        &self,
        zones: Vec<Zone>,
        sensors: Vec<HazardSensorConfig>,
    ) -> Result<usize, ThermoError> {
        for zone in &zones {
            zone.validate()?;
        }
        for sensor in &sensors {
            sensor.validate()?;
        }

        let added = {
            let mut model = self.write_model();
            let mut added = 0;
            for zone in zones {
                if let Entry::Vacant(entry) = model.zones.entry(zone.id.clone()) {
                    tracing::debug!(zone_id = %zone.id, "seeding zone");
                    entry.insert(zone);
                    added += 1;
                }
            }
            for sensor in sensors {
                if !model.sensors.iter().any(|s| s.sensor_id == sensor.sensor_id) {
                    tracing::debug!(sensor_id = %sensor.sensor_id, "seeding hazard sensor");
                    model.sensors.push(sensor);
                    added += 1;
                }
            }
            added
        };

        if added > 0 {
            self.persist().await?;
        }
        Ok(added)
    }

    fn read_model(&self) -> RwLockReadGuard<'_, Model> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_model(&self) -> RwLockWriteGuard<'_, Model> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ZoneStore for SqliteZoneStore {
    fn zones(&self) -> Result<Vec<Zone>, ThermoError> {
        Ok(self.read_model().zones.values().cloned().collect())
    }

    fn zone(&self, id: &ZoneId) -> Result<Option<Zone>, ThermoError> {
        Ok(self.read_model().zones.get(id).cloned())
    }

    fn update_zone<F>(&self, id: &ZoneId, mutate: F) -> Result<Zone, ThermoError>
    where
        F: FnOnce(&mut Zone),
    {
        let mut model = self.write_model();
        let zone = model.zones.get_mut(id).ok_or_else(|| zone_not_found(id))?;
        mutate(zone);
        Ok(zone.clone())
    }

    fn hazard_sensors(&self) -> Result<Vec<HazardSensorConfig>, ThermoError> {
        Ok(self.read_model().sensors.clone())
    }

    fn safety_alert(&self) -> bool {
        self.read_model().safety_alert
    }

    fn set_safety_alert(&self, active: bool) {
        self.write_model().safety_alert = active;
    }

    fn persist(&self) -> impl Future<Output = Result<(), ThermoError>> + Send {
        async move {
            let _guard = self.write.lock().await;
            let model = self.read_model().clone();
            write_all(&self.pool, &model).await?;
            tracing::debug!(zones = model.zones.len(), "zone store persisted");
            Ok(())
        }
    }
}
