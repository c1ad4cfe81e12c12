//! Cancellation handles for observers and subscriptions.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type CancelFn = Box<dyn FnOnce() + Send>;
type Slot = Mutex<Option<CancelFn>>;

/// RAII guard owning one subscription.
///
/// The subscription is removed when `cancel` is called or when the guard is
/// dropped, whichever comes first. Cancelling twice is a no-op.
#[must_use = "dropping a Cancellable cancels the subscription immediately"]
pub struct Cancellable {
    slot: Arc<Slot>,
}

impl Cancellable {
    pub(crate) fn new<F>(on_cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(on_cancel)))),
        }
    }

    /// Remove the subscription now.
    pub fn cancel(&self) {
        cancel_slot(&self.slot);
    }

    /// Whether the subscription has already been removed.
    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// A non-owning handle that can cancel this subscription later.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            slot: Arc::downgrade(&self.slot),
        }
    }
}

impl Drop for Cancellable {
    fn drop(&mut self) {
        cancel_slot(&self.slot);
    }
}

/// Non-owning cancellation handle.
///
/// Returned by cross-store observation, where the subscribing store owns the
/// subscription. Cancelling after the owner is gone does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    slot: Weak<Slot>,
}

impl CancelHandle {
    /// Remove the subscription if it is still alive.
    pub fn cancel(&self) {
        if let Some(slot) = self.slot.upgrade() {
            cancel_slot(&slot);
        }
    }

    /// Whether the subscription is still installed.
    pub fn is_active(&self) -> bool {
        self.slot
            .upgrade()
            .map(|slot| slot.lock().is_some())
            .unwrap_or(false)
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

fn cancel_slot(slot: &Slot) {
    // Take first so the callback runs without the slot locked.
    let on_cancel = slot.lock().take();
    if let Some(on_cancel) = on_cancel {
        on_cancel();
    }
}
