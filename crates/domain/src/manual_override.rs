//! Classification of an observed setpoint against the setpoint the
//! system expects the device to carry.

use serde::{Deserialize, Serialize};

/// Degrees within which an observed setpoint counts as the system's own write.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// How an observed setpoint relates to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetChange {
    /// Our own write settling on the device.
    Echo,
    /// A late notification carrying a value the scheduler already replaced
    /// with a higher one.
    Stale,
    /// Someone changed the device by hand.
    ManualOverride,
}

/// Classify `actual` against `expected`.
///
/// Rules are checked in order: within `tolerance` is an echo, below
/// `expected - tolerance` is stale, anything else is a manual override.
#[must_use]
pub fn classify(actual: f64, expected: f64, tolerance: f64) -> TargetChange {
    if (actual - expected).abs() < tolerance {
        TargetChange::Echo
    } else if actual < expected - tolerance {
        TargetChange::Stale
    } else {
        TargetChange::ManualOverride
    }
}
