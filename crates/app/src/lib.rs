//! # thermohub-app
//!
//! Application layer — the reconciliation services and **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `ZoneStore` — zones, hazard sensors and the safety latch
//!   - `DeviceStateFeed` — current device states and change notifications
//!   - `EventPublisher` — domain event fan-out
//!   - `RefreshPort` — coalesced and immediate snapshot refresh requests
//!   - `TargetResolver` — effective target of a zone
//! - Provide the services:
//!   - `Coordinator` — classifies device changes, debounces setpoints,
//!     detects manual overrides, builds snapshots
//!   - `SafetyMonitor` — latches an emergency shutdown on hazard alarms
//!   - `RefreshScheduler` — periodic and on-demand snapshot refresh with
//!     retry backoff
//! - Provide **in-process infrastructure** (event bus, state registry)
//!
//! ## Dependency rule
//! Depends on `thermohub-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_bus;
pub mod listener;
pub mod ports;
pub mod refresh_scheduler;
pub mod safety_monitor;
pub mod state_registry;

#[cfg(test)]
mod test_support;

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
