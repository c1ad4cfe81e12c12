//! Stores: the exclusive owners of state.
//!
//! A store runs the serialized reduce pipeline, hosts whole-state and
//! per-field observers, observes other stores, and for sharable states lives
//! in the process-wide shared registry.

mod any;
mod config;
mod draft;
mod observe;
mod shared;
mod storage;
mod store;

pub use any::AnyStore;
pub use config::{ConfigKey, ConfigPair};
pub use draft::Draft;
pub use storage::{DefaultStorageKey, StorageKey};
pub use store::{ReduceFrom, Store, WeakStore};
