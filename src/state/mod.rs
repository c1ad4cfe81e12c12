//! State, action and field definitions.
//!
//! States are plain value snapshots owned by a [`Store`](crate::Store).
//! Actions are typed events; their Rust type is their identity. Fields are
//! lenses used for per-field observation and writes.

mod action;
mod field;
mod state;

pub use action::{Action, AsAny};
pub use field::{Field, FieldKey};
pub use state::{
    ActionBindable, AnyState, AppState, AttachableState, ContainerState, NoParent, SharableState,
    SharedParent, State, SubStates,
};

pub(crate) use state::short_type_name;
