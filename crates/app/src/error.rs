//! Errors raised by the application core.

use thermohub_domain::error::ThermoError;
use thermohub_domain::id::ZoneId;

/// A refresh cycle could not assemble its snapshot.
///
/// Reported to the refresh scheduler, which owns retry and backoff.
#[derive(Debug, thiserror::Error)]
#[error("snapshot update failed")]
pub struct UpdateFailed {
    /// Zone being assembled when the failure happened, if any.
    pub zone: Option<ZoneId>,
    #[source]
    pub source: ThermoError,
}

impl UpdateFailed {
    #[must_use]
    pub fn new(zone: Option<ZoneId>, source: ThermoError) -> Self {
        Self { zone, source }
    }
}
