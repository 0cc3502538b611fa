//! # thermohubd — thermohub daemon
//!
//! Composition root that wires all adapters together and runs the
//! reconciliation services.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and initialise logging
//! - Initialize the `SQLite` connection pool, run migrations, seed zones
//!   and hazard sensors
//! - Construct the state registry, event bus and refresh scheduler
//! - Construct the coordinator and the safety monitor, injecting ports
//! - Start the MQTT bridge when enabled
//! - Tear everything down on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use thermohub_adapter_mqtt::bridge::MqttBridge;
use thermohub_adapter_storage_sqlite_sqlx::pool;
use thermohub_adapter_storage_sqlite_sqlx::zone_store::SqliteZoneStore;
use thermohub_app::coordinator::Coordinator;
use thermohub_app::event_bus::InProcessEventBus;
use thermohub_app::ports::{ZoneStore, ZoneTargetResolver};
use thermohub_app::refresh_scheduler::{self, RefreshStatus};
use thermohub_app::safety_monitor::SafetyMonitor;
use thermohub_app::state_registry::StateRegistry;
use thermohub_domain::event::Event;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Storage
    let db = pool::Config {
        database_url: config.database.url.clone(),
    }
    .build()
    .await?;
    let store = Arc::new(SqliteZoneStore::open(db.pool().clone()).await?);
    let seeded = store
        .seed(config.seed_zones()?, config.safety.sensors.clone())
        .await?;
    tracing::info!(seeded, "zone store ready");

    // In-process infrastructure
    let registry = Arc::new(StateRegistry::new(256));
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let (refresh, scheduler) = refresh_scheduler::channel(config.refresh.to_config());

    // Services
    let coordinator = Coordinator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        ZoneTargetResolver,
        refresh.clone(),
        Arc::clone(&event_bus),
        config.coordinator.to_config(),
    );
    let monitor = SafetyMonitor::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&event_bus),
        Some(refresh),
    );

    let status_task = tokio::spawn(log_status(scheduler.subscribe()));
    let events_task = tokio::spawn(log_events(event_bus.subscribe()));
    let scheduler_task = scheduler.spawn(coordinator.clone());

    let mqtt_task = if config.mqtt.enabled {
        let bridge = MqttBridge::new(
            config.mqtt.clone(),
            &store.zones()?,
            &store.hazard_sensors()?,
        );
        Some(bridge.spawn(Arc::clone(&registry)))
    } else {
        tracing::info!("MQTT bridge disabled");
        None
    };

    let devices = coordinator.setup()?;
    let safety = monitor.setup().await?;
    tracing::info!(devices, ?safety, "thermohubd running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    coordinator.teardown();
    monitor.teardown();
    if let Some(task) = mqtt_task {
        task.abort();
    }
    scheduler_task.abort();
    status_task.abort();
    events_task.abort();

    store.persist().await?;
    Ok(())
}

/// Log availability transitions of the read model.
async fn log_status(mut status: watch::Receiver<RefreshStatus>) {
    let mut available = true;
    while status.changed().await.is_ok() {
        let (now_available, error) = {
            let current = status.borrow_and_update();
            (current.available, current.last_error.clone())
        };
        if now_available != available {
            if now_available {
                tracing::info!("snapshot available again");
            } else {
                tracing::warn!(error = error.as_deref(), "snapshot unavailable");
            }
            available = now_available;
        }
    }
}

/// Log every domain event published on the bus.
async fn log_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                zone_id = event.zone_id.as_ref().map(ToString::to_string),
                data = %event.data,
                "event"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
