//! Event bus port — publish/subscribe for domain events.

use std::future::Future;

use thermohub_domain::error::ThermoError;
use thermohub_domain::event::Event;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ThermoError>> + Send;
}

impl<T: EventPublisher> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ThermoError>> + Send {
        (**self).publish(event)
    }
}
