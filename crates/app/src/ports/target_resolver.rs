//! Target resolver port — what temperature a zone should be at right now.
//!
//! Schedules, presets and boost live behind this trait; the core only
//! compares device setpoints against its answer.

use thermohub_domain::zone::Zone;

pub trait TargetResolver: Send + Sync {
    /// The effective target temperature of `zone`.
    fn effective_target(&self, zone: &Zone) -> f64;
}

impl<F> TargetResolver for F
where
    F: Fn(&Zone) -> f64 + Send + Sync,
{
    fn effective_target(&self, zone: &Zone) -> f64 {
        self(zone)
    }
}

/// Resolver without schedules: the stored zone target is the effective one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneTargetResolver;

impl TargetResolver for ZoneTargetResolver {
    fn effective_target(&self, zone: &Zone) -> f64 {
        zone.target_temperature
    }
}
