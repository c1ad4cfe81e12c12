use std::any::{self, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;

use super::any::AnyStore;
use super::store::Store;
use crate::error::{StoreError, StoreResult};
use crate::monitor::StoreMonitor;
use crate::runtime::MainContext;
use crate::state::{short_type_name, AttachableState, ContainerState, SharableState, SharedParent};

/// Shared stores by state type. Entries are never removed.
///
/// The lock is reentrant so that constructing one shared store may fetch
/// other shared stores from its reducer hook on the same thread.
static REGISTRY: Lazy<ReentrantMutex<RefCell<HashMap<TypeId, AnyStore>>>> =
    Lazy::new(|| ReentrantMutex::new(RefCell::new(HashMap::new())));

impl<S> Store<S>
where
    S: SharableState,
    S::Parent: SharedParent,
{
    /// The process-wide store for `S`.
    ///
    /// Created on first access from `S::default()` and primed with
    /// [`State::load_reducers`](crate::State::load_reducers). The hook sees
    /// the store already registered, so shared stores it fetches (including
    /// children attaching back to `S`) resolve to this one. A new store is
    /// then attached under its parent's shared store on the main context:
    /// inline when already there, scheduled otherwise.
    pub fn shared() -> Store<S> {
        let (store, created) = {
            let registry = REGISTRY.lock();
            let existing = lookup::<S>(&registry.borrow());
            match existing {
                Some(store) => (store, false),
                None => {
                    // Registered before the hook runs, so that a reentrant
                    // lookup from the hook finds this instance.
                    let store = Store::new(S::default());
                    registry
                        .borrow_mut()
                        .insert(TypeId::of::<S>(), store.erase());
                    S::load_reducers(&store);
                    (store, true)
                }
            }
        };

        if created {
            tracing::debug!(
                store = %store.id(),
                state = short_type_name(any::type_name::<S>()),
                "shared store created"
            );
            attach_to_parent(&store);
        }
        store
    }
}

fn lookup<S: SharableState>(stores: &HashMap<TypeId, AnyStore>) -> Option<Store<S>> {
    stores
        .get(&TypeId::of::<S>())
        .and_then(|store| store.downcast::<S>())
}

fn attach_to_parent<S>(child: &Store<S>)
where
    S: SharableState,
    S::Parent: SharedParent,
{
    let Some(parent) = <S::Parent as SharedParent>::shared_parent() else {
        return;
    };
    let child = child.clone();
    let attach = move || {
        if let Err(error) = parent.append(&child) {
            tracing::debug!(%error, "shared store left unattached");
        }
    };
    if MainContext::is_current() {
        attach();
    } else {
        MainContext::global().spawn(attach);
    }
}

impl<C: ContainerState> Store<C> {
    /// Attach a child store under this container.
    ///
    /// The child's snapshot is installed under its state id and kept current
    /// by a whole-state subscription. When the child is torn down its
    /// snapshot is evicted. A second child with the same state id is refused.
    pub fn append<S>(&self, child: &Store<S>) -> StoreResult<()>
    where
        S: AttachableState<Parent = C>,
    {
        MainContext::check("append");
        let state_id = child.state_id();
        let existing = self.read(|container| {
            container
                .sub_states()
                .get(&state_id)
                .map(|snapshot| snapshot.state_type())
        });
        if let Some(existing) = existing {
            let error = StoreError::DuplicateAttach {
                child: short_type_name(any::type_name::<S>()),
                parent: short_type_name(any::type_name::<C>()),
                state_id,
                existing,
            };
            tracing::warn!(store = %self.id(), child = %child.id(), "duplicate attach refused");
            StoreMonitor::shared().fatal(error.clone());
            return Err(error);
        }

        let container = self.downgrade();
        let subscription = self.observe(child, move |new: &S, _old: &S| {
            if let Some(container) = container.upgrade() {
                let snapshot = new.clone();
                container.mutate_internal(move |state| state.update_sub_state(&snapshot));
            }
        })?;

        let snapshot = child.get();
        self.mutate_internal(move |state| state.update_sub_state(&snapshot));

        let container = self.downgrade();
        child.set_destroy_callback(move |last: S| {
            subscription.cancel();
            if let Some(container) = container.upgrade() {
                let state_id = last.state_id();
                container.mutate_internal(move |state| {
                    state.sub_states_mut().remove(&state_id);
                });
            }
        });

        tracing::debug!(store = %self.id(), child = %child.id(), "child store attached");
        Ok(())
    }
}
