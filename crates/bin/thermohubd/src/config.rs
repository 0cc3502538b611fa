//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `thermohub.toml` in the working directory (or the path in
//! `THERMOHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;

use thermohub_adapter_mqtt::config::MqttConfig;
use thermohub_app::config::{CoordinatorConfig, RefreshConfig};
use thermohub_domain::device::DeviceAssignment;
use thermohub_domain::error::ThermoError;
use thermohub_domain::hazard::HazardSensorConfig;
use thermohub_domain::id::{DeviceId, ZoneId};
use thermohub_domain::manual_override::DEFAULT_TOLERANCE;
use thermohub_domain::zone::Zone;

const DEFAULT_PATH: &str = "thermohub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Device state coordinator tunables.
    pub coordinator: CoordinatorSection,
    /// Refresh cadence.
    pub refresh: RefreshSection,
    /// MQTT device bridge.
    pub mqtt: MqttConfig,
    /// Zones seeded into the store on first start.
    pub zones: Vec<ZoneConfig>,
    /// Hazard sensors seeded into the store on first start.
    pub safety: SafetyConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// Settle time of a setpoint change, in milliseconds.
    pub debounce_ms: u64,
    /// Echo tolerance in degrees.
    pub tolerance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub interval_secs: u64,
    pub cooldown_ms: u64,
    pub retry_base_ms: u64,
}

/// A zone definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_target")]
    pub target_temperature: f64,
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceAssignment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub sensors: Vec<HazardSensorConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_target() -> f64 {
    20.0
}

impl Config {
    /// Load configuration from `thermohub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("THERMOHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("THERMOHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("THERMOHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("THERMOHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = lookup("THERMOHUB_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.debounce_ms == 0 {
            return Err(ConfigError::Validation("coordinator.debounce_ms must be non-zero".to_string()));
        }
        if !(self.coordinator.tolerance.is_finite() && self.coordinator.tolerance > 0.0) {
            return Err(ConfigError::Validation("coordinator.tolerance must be positive".to_string()));
        }
        if self.refresh.interval_secs == 0 || self.refresh.retry_base_ms == 0 {
            return Err(ConfigError::Validation(
                "refresh.interval_secs and refresh.retry_base_ms must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled && self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::Validation("mqtt.keep_alive_secs must be at least 5".to_string()));
        }

        let mut ids = BTreeSet::new();
        for zone in &self.zones {
            if !ids.insert(&zone.id) {
                return Err(ConfigError::Validation(format!("duplicate zone id {}", zone.id)));
            }
        }
        self.seed_zones().map_err(ConfigError::Seed)?;
        for sensor in &self.safety.sensors {
            sensor.validate().map_err(ConfigError::Seed)?;
        }
        Ok(())
    }

    /// Build the configured zones.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Validation`] for a zone with an empty id or
    /// name or a non-finite target.
    pub fn seed_zones(&self) -> Result<Vec<Zone>, ThermoError> {
        self.zones.iter().map(ZoneConfig::to_zone).collect()
    }
}

impl ZoneConfig {
    fn to_zone(&self) -> Result<Zone, ThermoError> {
        self.devices
            .iter()
            .fold(
                Zone::builder()
                    .id(self.id.clone())
                    .name(self.name.clone())
                    .enabled(self.enabled)
                    .target_temperature(self.target_temperature),
                |builder, (id, assignment)| builder.assignment(id.clone(), assignment.clone()),
            )
            .build()
    }
}

impl CoordinatorSection {
    #[must_use]
    pub fn to_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            tolerance: self.tolerance,
        }
    }
}

impl RefreshSection {
    #[must_use]
    pub fn to_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.interval_secs),
            cooldown: Duration::from_millis(self.cooldown_ms),
            retry_base: Duration::from_millis(self.retry_base_ms),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:thermohub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "thermohub=info,sqlx=warn".to_string(),
        }
    }
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            cooldown_ms: 1_000,
            retry_base_ms: 2_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// A zone or hazard sensor definition is invalid.
    #[error("invalid zone or sensor definition")]
    Seed(#[source] ThermoError),
}
