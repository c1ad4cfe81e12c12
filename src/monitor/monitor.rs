use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use super::settings::{FatalPolicy, Settings};
use crate::cancel::Cancellable;
use crate::error::StoreError;
use crate::runtime::StoreId;
use crate::store::ReduceFrom;

/// Something that happened to a store.
///
/// Action and state types are carried by their type names, which keeps
/// recording cheap and lets observers match on them without downcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    CreateStore {
        store: StoreId,
        state: &'static str,
    },
    BeforeReduce {
        store: StoreId,
        from: ReduceFrom,
        action: &'static str,
    },
    AfterReduce {
        store: StoreId,
        from: ReduceFrom,
        action: &'static str,
        changed: bool,
    },
    ReduceNotRegistered {
        store: StoreId,
        from: ReduceFrom,
        action: &'static str,
    },
    /// The depender gate refused the reduce.
    ReduceRejected {
        store: StoreId,
        from: ReduceFrom,
        action: &'static str,
    },
    WillDirectUpdate {
        store: StoreId,
        field: Option<&'static str>,
    },
    DidUpdateState {
        store: StoreId,
        field: Option<&'static str>,
    },
    /// An action arrived while another reduce was running and was queued.
    ReduceInOtherReduce {
        store: StoreId,
        current: &'static str,
        queued: &'static str,
    },
    CyclicObserve {
        from: StoreId,
        to: StoreId,
    },
    DuplicateSubscription {
        store: StoreId,
        target: StoreId,
        field: Option<&'static str>,
    },
    DestroyStore {
        store: StoreId,
        state: &'static str,
    },
    FatalError(StoreError),
}

impl StoreEvent {
    /// The store the event is about, if any.
    pub fn store(&self) -> Option<StoreId> {
        match self {
            StoreEvent::CreateStore { store, .. }
            | StoreEvent::BeforeReduce { store, .. }
            | StoreEvent::AfterReduce { store, .. }
            | StoreEvent::ReduceNotRegistered { store, .. }
            | StoreEvent::ReduceRejected { store, .. }
            | StoreEvent::WillDirectUpdate { store, .. }
            | StoreEvent::DidUpdateState { store, .. }
            | StoreEvent::ReduceInOtherReduce { store, .. }
            | StoreEvent::DuplicateSubscription { store, .. }
            | StoreEvent::DestroyStore { store, .. } => Some(*store),
            StoreEvent::CyclicObserve { from, .. } => Some(*from),
            StoreEvent::FatalError(_) => None,
        }
    }
}

type MonitorObserver = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Process-wide diagnostic channel and settings holder.
pub struct StoreMonitor {
    observers: Mutex<Vec<(u64, MonitorObserver)>>,
    next_observer_id: AtomicU64,
    settings: RwLock<Settings>,
}

static SHARED: Lazy<StoreMonitor> = Lazy::new(|| StoreMonitor {
    observers: Mutex::new(Vec::new()),
    next_observer_id: AtomicU64::new(1),
    settings: RwLock::new(Settings::default()),
});

impl StoreMonitor {
    /// The process-wide monitor.
    pub fn shared() -> &'static StoreMonitor {
        &SHARED
    }

    /// Attach an observer receiving every event. Dropping or cancelling the
    /// returned guard detaches it.
    pub fn add_observer<F>(&'static self, observer: F) -> Cancellable
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let observer_id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().push((observer_id, Arc::new(observer)));
        Cancellable::new(move || {
            self.observers.lock().retain(|(id, _)| *id != observer_id);
        })
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.lock().is_empty()
    }

    pub fn settings(&self) -> Settings {
        *self.settings.read()
    }

    pub fn configure(&self, settings: Settings) {
        tracing::debug!(?settings, "store monitor configured");
        *self.settings.write() = settings;
    }

    /// Toggle strict mode, leaving the other settings alone.
    pub fn set_strict_mode(&self, strict_mode: bool) {
        self.settings.write().strict_mode = strict_mode;
    }

    pub fn is_strict_mode(&self) -> bool {
        self.settings.read().strict_mode
    }

    /// Forward an event to observers. The event is only built when someone
    /// is listening.
    pub(crate) fn record(&self, make: impl FnOnce() -> StoreEvent) {
        let observers = self.snapshot();
        if observers.is_empty() {
            return;
        }
        let event = make();
        for observer in observers {
            observer(&event);
        }
    }

    /// Report a fatal-class diagnostic.
    ///
    /// With observers attached it is delivered as [`StoreEvent::FatalError`].
    /// Without any, the configured [`FatalPolicy`] decides between panicking
    /// and continuing.
    pub fn fatal(&self, error: StoreError) {
        tracing::error!(%error, "fatal store diagnostic");
        let observers = self.snapshot();
        if observers.is_empty() {
            match self.settings().fatal_policy {
                FatalPolicy::Halt => panic!("{error}"),
                FatalPolicy::Continue => return,
            }
        }
        let event = StoreEvent::FatalError(error);
        for observer in observers {
            observer(&event);
        }
    }

    fn snapshot(&self) -> Vec<MonitorObserver> {
        self.observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_receives_fatal_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let guard = StoreMonitor::shared().add_observer(move |event| {
            if let StoreEvent::FatalError(StoreError::OffMainContext { operation }) = event {
                if *operation == "monitor-test" {
                    s.lock().push(*operation);
                }
            }
        });

        StoreMonitor::shared().fatal(StoreError::OffMainContext {
            operation: "monitor-test",
        });
        assert_eq!(*seen.lock(), vec!["monitor-test"]);

        guard.cancel();
        // Another observer keeps the default policy from halting.
        let _other = StoreMonitor::shared().add_observer(|_| {});
        StoreMonitor::shared().fatal(StoreError::OffMainContext {
            operation: "monitor-test",
        });
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn event_store_accessor() {
        let id = StoreId::next();
        let event = StoreEvent::DestroyStore {
            store: id,
            state: "Counter",
        };
        assert_eq!(event.store(), Some(id));
        let fatal = StoreEvent::FatalError(StoreError::OffMainContext { operation: "x" });
        assert_eq!(fatal.store(), None);
    }
}
