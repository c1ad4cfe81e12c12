//! # Flowstore
//!
//! Action-driven state stores for Rust.
//!
//! A [`Store`] owns one state value and changes it only through typed
//! [`Action`]s handled by registered reducers. Observers are told about each
//! change, either for the whole state or for a single [`Field`].
//!
//! ## Reduce pipeline
//!
//! - `send` / `apply` reduce synchronously, `dispatch` hops onto the
//!   [`MainContext`]
//! - An action submitted while the same store is reducing is queued and
//!   processed afterwards, in submission order
//! - A reducer may be gated by [`Depender`]s registered in the [`Directory`]
//!
//! ## Store graph
//!
//! Stores can observe each other. The [`ObservationGraph`] refuses any
//! subscription that would make updates loop between stores. States that
//! implement [`SharableState`] get one process-wide store, created on first
//! access and attached under its parent container.
//!
//! ## Diagnostics
//!
//! Every notable step is reported to the [`StoreMonitor`] and logged with
//! `tracing`. Misuse is reported as a [`StoreError`].

pub mod cancel;
pub mod depender;
pub mod error;
pub mod graph;
pub mod monitor;
pub mod runtime;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use cancel::{CancelHandle, Cancellable};
pub use depender::{Depender, DependerId, Directory};
pub use error::{StoreError, StoreResult};
pub use graph::ObservationGraph;
pub use monitor::{FatalPolicy, Settings, StoreEvent, StoreMonitor};
pub use runtime::{MainContext, StoreId};
pub use state::{
    Action, ActionBindable, AnyState, AppState, AttachableState, ContainerState, Field, FieldKey,
    NoParent, SharableState, SharedParent, State, SubStates,
};
pub use store::{
    AnyStore, ConfigKey, ConfigPair, DefaultStorageKey, Draft, ReduceFrom, StorageKey, Store,
    WeakStore,
};
