//! Event — an immutable record of something the core did.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{EventId, ZoneId};
use crate::time::{Timestamp, now};

/// Kinds of events published on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A device setpoint was changed by hand and adopted as zone target.
    ManualOverrideDetected,
    /// A hazard sensor tripped and all zones were disabled.
    SafetyShutdown,
    /// The safety latch was cleared by an operator.
    SafetyReset,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManualOverrideDetected => f.write_str("manual_override_detected"),
            Self::SafetyShutdown => f.write_str("safety_shutdown"),
            Self::SafetyReset => f.write_str("safety_reset"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub zone_id: Option<ZoneId>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, zone_id: Option<ZoneId>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            zone_id,
            data,
            timestamp: now(),
        }
    }
}
