//! Refresh port — asks whoever owns the read model to rebuild it.

/// Request a snapshot refresh. Both calls are fire-and-forget.
pub trait RefreshPort: Send + Sync {
    /// Request a refresh that may be rate-limited and merged with others.
    fn request_refresh(&self);

    /// Request a refresh that bypasses coalescing.
    fn request_immediate_refresh(&self);
}

impl<T: RefreshPort> RefreshPort for std::sync::Arc<T> {
    fn request_refresh(&self) {
        (**self).request_refresh();
    }

    fn request_immediate_refresh(&self) {
        (**self).request_immediate_refresh();
    }
}
