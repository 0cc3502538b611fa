//! # thermohub-domain
//!
//! Pure domain model for the thermohub heating controller.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Zones** (heating areas with target/current temperature and assigned devices)
//! - Define **Device state records** (primary value + attributes) and state changes
//! - Define **Hazard sensor** configuration and alarm matching
//! - Classify observed target-temperature changes (echo / stale / manual override)
//! - Build the per-refresh **Snapshot** read model
//! - Define **Events** published by the core
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod device;
pub mod event;
pub mod hazard;
pub mod manual_override;
pub mod snapshot;
pub mod zone;
