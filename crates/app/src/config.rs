//! Tunables of the coordinator and the refresh scheduler.
//!
//! The defaults are the values the reconciliation rules were tuned with;
//! the daemon maps its TOML sections onto these structs.

use std::time::Duration;

use thermohub_domain::manual_override::DEFAULT_TOLERANCE;

/// Settings of the device state coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// How long a setpoint change must settle before it is classified.
    pub debounce: Duration,
    /// Degrees within which a setpoint counts as the system's own write.
    pub tolerance: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Settings of the refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Cadence of the periodic full refresh.
    pub interval: Duration,
    /// Minimum spacing between a coalesced refresh and the previous cycle.
    pub cooldown: Duration,
    /// First retry delay after a failed cycle, doubled per consecutive failure.
    pub retry_base: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cooldown: Duration::from_secs(1),
            retry_base: Duration::from_secs(2),
        }
    }
}

impl RefreshConfig {
    /// Delay before retrying after `failures` consecutive failed cycles,
    /// never longer than the regular interval.
    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.retry_base
            .saturating_mul(1 << exponent)
            .min(self.interval)
    }
}
