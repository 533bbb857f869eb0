//! Delegate notifications.

use parking_lot::RwLock;
use std::sync::Arc;

/// Observer of session transitions.
///
/// Called synchronously on the task that caused the transition; keep the
/// handlers short.
pub trait DeliveryDelegate: Send + Sync {
    /// The endpoint refused the auth token during an upload.
    fn on_invalid_token(&self) {}

    /// A sign-in or account generation completed.
    fn on_sign_in(&self) {}

    /// Sign-out finished; queue and credentials are already cleared.
    fn on_sign_out(&self) {}
}

/// Shared, replaceable delegate reference.
#[derive(Default)]
pub(crate) struct DelegateSlot {
    inner: RwLock<Option<Arc<dyn DeliveryDelegate>>>,
}

impl DelegateSlot {
    pub(crate) fn set(&self, delegate: Arc<dyn DeliveryDelegate>) {
        *self.inner.write() = Some(delegate);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Run `f` against the current delegate, if any, without holding the lock.
    pub(crate) fn notify(&self, f: impl FnOnce(&dyn DeliveryDelegate)) {
        let delegate = self.inner.read().clone();
        if let Some(delegate) = delegate {
            f(delegate.as_ref());
        }
    }
}
