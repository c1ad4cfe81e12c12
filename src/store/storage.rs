use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::store::Store;
use crate::state::State;

/// Key type for a value kept in a store's extension storage.
///
/// ```
/// use flowstore::{State, StorageKey, Store};
///
/// #[derive(Clone, Debug, Default)]
/// struct Session;
/// impl State for Session {}
///
/// struct LastError;
/// impl StorageKey for LastError {
///     type Value = String;
/// }
///
/// let store = Store::new(Session);
/// assert_eq!(store.storage::<LastError>(), None);
/// store.set_storage::<LastError>("timeout".to_string());
/// assert_eq!(store.storage::<LastError>().as_deref(), Some("timeout"));
/// ```
pub trait StorageKey: 'static {
    type Value: Clone + Send + Sync + 'static;
}

/// A storage key with a fallback value.
pub trait DefaultStorageKey: StorageKey {
    fn default_value() -> Self::Value;
}

/// Values attached to a store, one per key type.
#[derive(Default)]
pub(crate) struct Storage {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Storage {
    fn get<K: StorageKey>(&self) -> Option<K::Value> {
        self.values
            .get(&TypeId::of::<K>())
            .and_then(|value| value.downcast_ref::<K::Value>())
            .cloned()
    }

    fn insert<K: StorageKey>(&mut self, value: K::Value) -> Option<K::Value> {
        self.values
            .insert(TypeId::of::<K>(), Box::new(value))
            .and_then(|old| old.downcast::<K::Value>().ok())
            .map(|old| *old)
    }

    fn remove<K: StorageKey>(&mut self) -> Option<K::Value> {
        self.values
            .remove(&TypeId::of::<K>())
            .and_then(|old| old.downcast::<K::Value>().ok())
            .map(|old| *old)
    }

    /// Keep the existing value if another caller got there first.
    fn get_or_insert<K: StorageKey>(&mut self, value: K::Value) -> K::Value {
        self.values
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(value.clone()))
            .downcast_ref::<K::Value>()
            .cloned()
            .unwrap_or(value)
    }
}

impl<S: State> Store<S> {
    pub fn storage<K: StorageKey>(&self) -> Option<K::Value> {
        self.inner.storage.lock().get::<K>()
    }

    /// Store a value under `K`, returning the previous one.
    pub fn set_storage<K: StorageKey>(&self, value: K::Value) -> Option<K::Value> {
        self.inner.storage.lock().insert::<K>(value)
    }

    pub fn remove_storage<K: StorageKey>(&self) -> Option<K::Value> {
        self.inner.storage.lock().remove::<K>()
    }

    /// Read `K`, storing and returning `make()` when absent. `make` runs
    /// without the storage locked.
    pub fn storage_or_insert_with<K, F>(&self, make: F) -> K::Value
    where
        K: StorageKey,
        F: FnOnce() -> K::Value,
    {
        if let Some(value) = self.storage::<K>() {
            return value;
        }
        let value = make();
        self.inner.storage.lock().get_or_insert::<K>(value)
    }

    /// Read `K`, storing its default value when absent.
    pub fn storage_or_default<K: DefaultStorageKey>(&self) -> K::Value {
        self.storage_or_insert_with::<K, _>(K::default_value)
    }
}
