use std::any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::monitor::StoreMonitor;
use crate::runtime::MainContext;
use crate::state::{short_type_name, Action, AnyState};

/// Stable identifier of a depender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependerId(Cow<'static, str>);

impl DependerId {
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// The default id of a depender type: its name without module path.
    pub fn of<D: ?Sized>() -> Self {
        Self::from_static(short_type_name(any::type_name::<D>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for DependerId {
    fn from(id: &'static str) -> Self {
        Self::from_static(id)
    }
}

impl From<String> for DependerId {
    fn from(id: String) -> Self {
        Self(Cow::Owned(id))
    }
}

impl fmt::Display for DependerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external gatekeeper consulted before a gated reducer runs.
///
/// Dependers may keep interior state and flip their answer between calls.
pub trait Depender: Send + Sync + 'static {
    fn depender_id(&self) -> DependerId {
        DependerId::of::<Self>()
    }

    /// Whether the reduce of `action` on `state` may proceed.
    fn can_reduce(&self, state: &dyn AnyState, action: &dyn Action) -> bool;
}

/// Process-wide registry of dependers by id.
#[derive(Default)]
pub struct Directory {
    dependers: RwLock<HashMap<DependerId, Arc<dyn Depender>>>,
}

static SHARED: Lazy<Directory> = Lazy::new(Directory::default);

impl Directory {
    pub fn shared() -> &'static Directory {
        &SHARED
    }

    /// Register a depender under its id. Registration is one-shot: a second
    /// registration of the same id is reported and the original is kept.
    pub fn register<D: Depender>(&self, depender: Arc<D>) -> StoreResult<()> {
        MainContext::check("register_depender");
        let id = depender.depender_id();
        {
            let mut dependers = self.dependers.write();
            if !dependers.contains_key(&id) {
                tracing::debug!(depender = %id, "reduce depender registered");
                dependers.insert(id, depender);
                return Ok(());
            }
        }
        let error = StoreError::DuplicateDepender { depender: id };
        StoreMonitor::shared().fatal(error.clone());
        Err(error)
    }

    pub fn get(&self, id: &DependerId) -> Option<Arc<dyn Depender>> {
        self.dependers.read().get(id).cloned()
    }

    pub fn contains(&self, id: &DependerId) -> bool {
        self.dependers.read().contains_key(id)
    }

    /// Run the depender gate for one reduce.
    ///
    /// Every id is resolved first and each missing one is reported. Dependers
    /// are then asked in declaration order, stopping at the first refusal; a
    /// missing depender counts as a refusal.
    pub fn check_dependency(
        &self,
        ids: &[DependerId],
        state: &dyn AnyState,
        action: &dyn Action,
    ) -> bool {
        if ids.is_empty() {
            return true;
        }

        let resolved: Vec<Option<Arc<dyn Depender>>> = {
            let dependers = self.dependers.read();
            ids.iter().map(|id| dependers.get(id).cloned()).collect()
        };

        for (id, depender) in ids.iter().zip(&resolved) {
            if depender.is_none() {
                StoreMonitor::shared().fatal(StoreError::MissingDepender {
                    depender: id.clone(),
                    state: state.state_type(),
                    action: format!("{action:?}"),
                });
            }
        }

        resolved.iter().all(|depender| match depender {
            Some(depender) => depender.can_reduce(state, action),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::StoreEvent;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct Form;
    impl crate::State for Form {}

    #[derive(Debug)]
    struct Submit;
    impl Action for Submit {}

    struct Toggle {
        id: &'static str,
        open: AtomicBool,
        calls: AtomicUsize,
    }

    impl Toggle {
        fn new(id: &'static str, open: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                open: AtomicBool::new(open),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Depender for Toggle {
        fn depender_id(&self) -> DependerId {
            DependerId::from_static(self.id)
        }

        fn can_reduce(&self, _state: &dyn AnyState, _action: &dyn Action) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.open.load(Ordering::SeqCst)
        }
    }

    struct Plain;

    impl Depender for Plain {
        fn can_reduce(&self, _state: &dyn AnyState, _action: &dyn Action) -> bool {
            true
        }
    }

    #[test]
    fn default_id_is_type_name() {
        assert_eq!(Plain.depender_id(), DependerId::from("Plain"));
    }

    #[test]
    fn empty_gate_passes() {
        let directory = Directory::default();
        assert!(directory.check_dependency(&[], &Form, &Submit));
    }

    #[test]
    fn stops_at_first_refusal() {
        let directory = Directory::default();
        let first = Toggle::new("dir-first", false);
        let second = Toggle::new("dir-second", true);
        directory.register(Arc::clone(&first)).unwrap();
        directory.register(Arc::clone(&second)).unwrap();

        let ids = [DependerId::from("dir-first"), DependerId::from("dir-second")];
        assert!(!directory.check_dependency(&ids, &Form, &Submit));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);

        first.open.store(true, Ordering::SeqCst);
        assert!(directory.check_dependency(&ids, &Form, &Submit));
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_registration_keeps_original() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let _guard = StoreMonitor::shared().add_observer(move |event| {
            if let StoreEvent::FatalError(StoreError::DuplicateDepender { depender }) = event {
                if depender.as_str() == "dir-dup" {
                    s.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let directory = Directory::default();
        let original = Toggle::new("dir-dup", true);
        directory.register(Arc::clone(&original)).unwrap();
        let err = directory.register(Toggle::new("dir-dup", false)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate registration of reduce depender 'dir-dup'"
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let ids = [DependerId::from("dir-dup")];
        assert!(directory.check_dependency(&ids, &Form, &Submit));
    }

    #[test]
    fn missing_depender_is_reported_and_refuses() {
        let missing = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let m = Arc::clone(&missing);
        let _guard = StoreMonitor::shared().add_observer(move |event| {
            if let StoreEvent::FatalError(StoreError::MissingDepender { depender, .. }) = event {
                if depender.as_str().starts_with("dir-missing") {
                    m.lock().push(depender.to_string());
                }
            }
        });

        let directory = Directory::default();
        let present = Toggle::new("dir-present", true);
        directory.register(Arc::clone(&present)).unwrap();

        let ids = [
            DependerId::from("dir-missing-a"),
            DependerId::from("dir-present"),
            DependerId::from("dir-missing-b"),
        ];
        assert!(!directory.check_dependency(&ids, &Form, &Submit));
        assert_eq!(
            *missing.lock(),
            vec!["dir-missing-a".to_string(), "dir-missing-b".to_string()]
        );
        assert_eq!(present.calls.load(Ordering::SeqCst), 0);
    }
}
