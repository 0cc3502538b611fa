//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`ThermoError`] via `From` when crossing a port boundary.

/// Top-level error shared by every port.
#[derive(Debug, thiserror::Error)]
pub enum ThermoError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// An adapter failed to read or write persistent state.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("identifier must not be empty")]
    EmptyId,

    #[error("temperature must be a finite number, got {0}")]
    NonFiniteTemperature(f64),

    #[error("monitored attribute must not be empty")]
    EmptyAttribute,
}

/// A lookup by identifier found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
