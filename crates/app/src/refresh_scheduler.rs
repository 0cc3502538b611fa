//! Refresh scheduler — owns the cadence of snapshot rebuilds.
//!
//! Refreshes happen on a fixed interval, on coalesced requests (at most one
//! per cooldown), and on immediate requests that skip the cooldown. A failed
//! cycle keeps the previous snapshot, marks it unavailable and retries with
//! exponential backoff.
//!
//! The latest outcome is published on a [`watch`] channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use thermohub_domain::id::ZoneId;
use thermohub_domain::snapshot::Snapshot;
use thermohub_domain::time::{Timestamp, now};

use crate::config::RefreshConfig;
use crate::error::UpdateFailed;
use crate::ports::RefreshPort;

/// Something able to assemble a fresh snapshot.
pub trait SnapshotSource: Send + Sync {
    /// Build a snapshot of the whole system.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateFailed`] when the snapshot cannot be assembled.
    fn build_snapshot(&self) -> Result<Snapshot, UpdateFailed>;
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn build_snapshot(&self) -> Result<Snapshot, UpdateFailed> {
        (**self).build_snapshot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    /// May wait for the cooldown and merge with other requests.
    Coalesced,
    Immediate,
}

/// Latest outcome of the refresh loop.
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    /// Last successfully built snapshot, kept across failures.
    pub snapshot: Option<Arc<Snapshot>>,
    /// Whether the last cycle succeeded.
    pub available: bool,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_refresh: Option<Timestamp>,
}

/// Sending half handed to the services; implements [`RefreshPort`].
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    sender: mpsc::UnboundedSender<RefreshRequest>,
}

impl RefreshHandle {
    fn send(&self, request: RefreshRequest) {
        if self.sender.send(request).is_err() {
            tracing::debug!(?request, "refresh scheduler stopped, request dropped");
        }
    }
}

impl RefreshPort for RefreshHandle {
    fn request_refresh(&self) {
        self.send(RefreshRequest::Coalesced);
    }

    fn request_immediate_refresh(&self) {
        self.send(RefreshRequest::Immediate);
    }
}

/// The refresh loop. Create one with [`channel`], then [`spawn`](Self::spawn) it.
pub struct RefreshScheduler {
    config: RefreshConfig,
    receiver: mpsc::UnboundedReceiver<RefreshRequest>,
    status: watch::Sender<RefreshStatus>,
}

/// Create a scheduler and the handle used to send it requests.
///
/// The loop ends once every handle is dropped.
#[must_use]
pub fn channel(config: RefreshConfig) -> (RefreshHandle, RefreshScheduler) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (status, _) = watch::channel(RefreshStatus::default());
    (
        RefreshHandle { sender },
        RefreshScheduler {
            config,
            receiver,
            status,
        },
    )
}

impl RefreshScheduler {
    /// Watch the outcome of every cycle.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.status.subscribe()
    }

    /// Run the loop on the tokio runtime.
    pub fn spawn<S>(self, source: S) -> JoinHandle<()>
    where
        S: SnapshotSource + 'static,
    {
        tokio::spawn(self.run(source))
    }

    /// Refresh once right away, then serve requests until every handle is
    /// dropped.
    pub async fn run<S: SnapshotSource>(mut self, source: S) {
        let mut next_due = Instant::now();
        let mut last_run: Option<Instant> = None;

        loop {
            let request = tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                () = tokio::time::sleep_until(next_due) => RefreshRequest::Immediate,
            };

            if request == RefreshRequest::Coalesced
                && let Some(last) = last_run
                && !self.wait_cooldown(last + self.config.cooldown).await
            {
                break;
            }

            // everything queued so far is served by this cycle
            while self.receiver.try_recv().is_ok() {}

            let failures = self.refresh_once(&source);
            let ran_at = Instant::now();
            last_run = Some(ran_at);
            next_due = if failures == 0 {
                ran_at + self.config.interval
            } else {
                ran_at + self.config.retry_delay(failures)
            };
        }

        tracing::debug!("refresh scheduler stopped");
    }

    /// Wait until `ready_at`, absorbing coalesced requests. An immediate
    /// request ends the wait early. Returns `false` once the channel closed.
    async fn wait_cooldown(&mut self, ready_at: Instant) -> bool {
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(ready_at) => return true,
                request = self.receiver.recv() => match request {
                    Some(RefreshRequest::Immediate) => return true,
                    Some(RefreshRequest::Coalesced) => {}
                    None => return false,
                },
            }
        }
    }

    /// Run one cycle and publish its outcome. Returns the number of
    /// consecutive failures after it.
    fn refresh_once<S: SnapshotSource>(&self, source: &S) -> u32 {
        match source.build_snapshot() {
            Ok(snapshot) => {
                let zones = snapshot.zones.len();
                let snapshot = Arc::new(snapshot);
                self.status.send_modify(|status| {
                    status.snapshot = Some(snapshot);
                    status.available = true;
                    status.last_error = None;
                    status.consecutive_failures = 0;
                    status.last_refresh = Some(now());
                });
                tracing::trace!(zones, "snapshot refreshed");
                0
            }
            Err(err) => {
                let message = format!("{err}: {}", err.source);
                let mut failures = 0;
                self.status.send_modify(|status| {
                    status.available = false;
                    status.last_error = Some(message);
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    failures = status.consecutive_failures;
                });
                tracing::warn!(
                    zone_id = err.zone.as_ref().map(ZoneId::as_str),
                    error = %err.source,
                    failures,
                    retry_in = ?self.config.retry_delay(failures),
                    "snapshot refresh failed"
                );
                failures
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use thermohub_domain::error::ThermoError;

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl FakeSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl SnapshotSource for FakeSource {
        fn build_snapshot(&self) -> Result<Snapshot, UpdateFailed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                let io = std::io::Error::other("database locked");
                return Err(UpdateFailed::new(None, ThermoError::Storage(Box::new(io))));
            }
            Ok(Snapshot {
                zones: BTreeMap::new(),
                safety_alert: false,
                generated_at: now(),
            })
        }
    }

    fn start() -> (RefreshHandle, watch::Receiver<RefreshStatus>, Arc<FakeSource>) {
        let (handle, scheduler) = channel(RefreshConfig::default());
        let status = scheduler.subscribe();
        let source = Arc::new(FakeSource::default());
        scheduler.spawn(Arc::clone(&source));
        (handle, status, source)
    }

    async fn advance(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_refresh_once_on_start() {
        let (_handle, status, source) = start();
        advance(10).await;

        assert_eq!(source.calls(), 1);
        let status = status.borrow();
        assert!(status.available);
        assert!(status.snapshot.is_some());
        assert!(status.last_refresh.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn should_merge_coalesced_requests_within_cooldown() {
        let (handle, _status, source) = start();
        advance(10).await;

        for _ in 0..5 {
            handle.request_refresh();
        }
        advance(10).await;
        assert_eq!(source.calls(), 1);

        advance(1_000).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_bypass_cooldown_for_immediate_request() {
        let (handle, _status, source) = start();
        advance(10).await;

        handle.request_refresh();
        handle.request_immediate_refresh();
        advance(10).await;

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_refresh_on_interval() {
        let (_handle, _status, source) = start();
        advance(10).await;
        assert_eq!(source.calls(), 1);

        advance(30_000).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_previous_snapshot_when_refresh_fails() {
        let (handle, status, source) = start();
        advance(10).await;

        source.fail(true);
        handle.request_immediate_refresh();
        advance(10).await;

        let status = status.borrow();
        assert!(!status.available);
        assert!(status.snapshot.is_some());
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.as_deref().unwrap().contains("database locked"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_with_backoff_after_failure() {
        let (_handle, status, source) = start();
        source.fail(true);
        advance(10).await;
        assert_eq!(source.calls(), 1);

        // first retry after the 2 s base delay
        advance(2_000).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(status.borrow().consecutive_failures, 2);

        // second retry waits 4 s
        advance(3_000).await;
        assert_eq!(source.calls(), 2);
        advance(1_100).await;
        assert_eq!(source.calls(), 3);

        source.fail(false);
        advance(8_000).await;
        assert_eq!(source.calls(), 4);
        assert!(status.borrow().available);
        assert_eq!(status.borrow().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_when_every_handle_dropped() {
        let (handle, scheduler) = channel(RefreshConfig::default());
        let task = scheduler.spawn(Arc::new(FakeSource::default()));

        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
