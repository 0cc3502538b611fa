//! Filtered subscriptions to the device state feed.

use std::collections::BTreeSet;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use thermohub_domain::device::StateChange;
use thermohub_domain::id::DeviceId;

use crate::ports::DeviceStateFeed;

/// A background task dispatching state changes of a fixed device set to a
/// handler. Dropping the listener unsubscribes it.
pub struct Listener {
    devices: BTreeSet<DeviceId>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Subscribe to `feed` and spawn the dispatch task.
    ///
    /// The subscription is taken before this returns, so no change published
    /// afterwards is missed. Handlers run one at a time, in feed order.
    pub fn spawn<F, H, Fut>(feed: &F, devices: BTreeSet<DeviceId>, mut handler: H) -> Self
    where
        F: DeviceStateFeed + ?Sized,
        H: FnMut(StateChange) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut stream = BroadcastStream::new(feed.subscribe());
        let filter = devices.clone();
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(change) if filter.contains(&change.device_id) => handler(change).await,
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "state listener lagged behind, changes dropped");
                    }
                }
            }
            tracing::debug!("state feed closed, listener stopped");
        });

        Self { devices, handle }
    }

    /// The device ids this listener dispatches.
    #[must_use]
    pub fn devices(&self) -> &BTreeSet<DeviceId> {
        &self.devices
    }

    /// Stop dispatching.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
