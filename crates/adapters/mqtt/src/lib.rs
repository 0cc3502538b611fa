//! # thermohub-adapter-mqtt
//!
//! MQTT adapter — feeds device states published on an MQTT broker into the
//! in-process state registry.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker (re-subscribing after every reconnect)
//! - Map each zone device to its state topic
//! - Translate payloads into device state records
//!
//! ## Dependency rule
//! Same as other adapters: depends on `thermohub-app` and `thermohub-domain`.

pub mod bridge;
pub mod config;
pub mod error;
pub mod payload;
