use std::any::{self, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::store::Store;
use crate::state::{short_type_name, State};

/// Key type for a value handed to a store when it is built.
///
/// Unlike [`StorageKey`](crate::StorageKey) values, configuration is fixed
/// for the life of the store.
///
/// ```
/// use flowstore::{ConfigKey, ConfigPair, State, Store};
///
/// #[derive(Clone, Debug, Default)]
/// struct Feed;
/// impl State for Feed {}
///
/// struct PageSize;
/// impl ConfigKey for PageSize {
///     type Value = usize;
/// }
///
/// let store = Store::with_config(Feed, vec![ConfigPair::new::<PageSize>(50)]);
/// assert_eq!(store.config::<PageSize>(), Some(50));
/// ```
pub trait ConfigKey: 'static {
    type Value: Clone + Send + Sync + 'static;
}

/// One key and value of a store's initial configuration.
#[derive(Clone)]
pub struct ConfigPair {
    key: TypeId,
    name: &'static str,
    value_type: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl ConfigPair {
    pub fn new<K: ConfigKey>(value: K::Value) -> Self {
        Self {
            key: TypeId::of::<K>(),
            name: short_type_name(any::type_name::<K>()),
            value_type: short_type_name(any::type_name::<K::Value>()),
            value: Arc::new(value),
        }
    }
}

impl fmt::Debug for ConfigPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.value_type)
    }
}

/// Read-only configuration captured at construction.
pub(crate) struct StoreConfig {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl StoreConfig {
    pub(crate) fn new(pairs: Vec<ConfigPair>) -> Self {
        let values = pairs
            .into_iter()
            .map(|pair| (pair.key, pair.value))
            .collect();
        Self { values }
    }

    fn get<K: ConfigKey>(&self) -> Option<K::Value> {
        self.values
            .get(&TypeId::of::<K>())
            .and_then(|value| value.downcast_ref::<K::Value>())
            .cloned()
    }
}

impl<S: State> Store<S> {
    /// Read an initial configuration value.
    pub fn config<K: ConfigKey>(&self) -> Option<K::Value> {
        self.inner.config.get::<K>()
    }

    /// Read an initial configuration value, falling back to `default`.
    pub fn config_or<K: ConfigKey>(&self, default: K::Value) -> K::Value {
        self.config::<K>().unwrap_or(default)
    }

    pub fn config_or_else<K, F>(&self, default: F) -> K::Value
    where
        K: ConfigKey,
        F: FnOnce() -> K::Value,
    {
        self.config::<K>().unwrap_or_else(default)
    }
}
