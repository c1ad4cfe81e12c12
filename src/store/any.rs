use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use super::store::Store;
use crate::runtime::StoreId;
use crate::state::{short_type_name, State};

/// A store with its state type erased.
#[derive(Clone)]
pub struct AnyStore {
    id: StoreId,
    state_type: &'static str,
    store: Arc<dyn Any + Send + Sync>,
}

impl AnyStore {
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Name of the state type, without module path.
    pub fn state_type(&self) -> &'static str {
        self.state_type
    }

    /// Recover the typed handle. `None` when `S` is not the erased state type.
    pub fn downcast<S: State>(&self) -> Option<Store<S>> {
        self.store.downcast_ref::<Store<S>>().cloned()
    }

    pub fn is<S: State>(&self) -> bool {
        self.store.is::<Store<S>>()
    }
}

impl fmt::Debug for AnyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyStore")
            .field("id", &self.id)
            .field("state_type", &self.state_type)
            .finish()
    }
}

impl<S: State> Store<S> {
    /// Erase the state type, keeping a strong handle.
    pub fn erase(&self) -> AnyStore {
        AnyStore {
            id: self.id(),
            state_type: short_type_name(any::type_name::<S>()),
            store: Arc::new(self.clone()),
        }
    }
}

impl<S: State> From<Store<S>> for AnyStore {
    fn from(store: Store<S>) -> Self {
        store.erase()
    }
}
