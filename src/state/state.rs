use std::any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::action::{Action, AsAny};
use crate::store::Store;

/// Strip the module path from a type name, keeping generic arguments.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let generics = full.find('<').unwrap_or(full.len());
    match full[..generics].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// A value snapshot owned by a store.
///
/// # Examples
///
/// ```
/// use flowstore::State;
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter {
///     count: i64,
/// }
///
/// impl State for Counter {}
///
/// assert_eq!(Counter::default().state_id(), "Counter");
/// ```
pub trait State: Clone + Debug + Send + Sync + 'static {
    /// Identifier used when the state is attached under a container.
    /// Defaults to the type name without its module path.
    fn state_id(&self) -> String {
        short_type_name(any::type_name::<Self>()).to_string()
    }

    /// Hook run when a store is primed for this state, used to register
    /// the state's own reducers.
    fn load_reducers(store: &Store<Self>) {
        let _ = store;
    }
}

/// Type-erased view of a state, as seen by dependers and containers.
pub trait AnyState: AsAny + Debug + Send + Sync + 'static {
    fn snapshot_id(&self) -> String;

    fn state_type(&self) -> &'static str;
}

impl<S: State> AnyState for S {
    fn snapshot_id(&self) -> String {
        self.state_id()
    }

    fn state_type(&self) -> &'static str {
        short_type_name(any::type_name::<S>())
    }
}

impl dyn AnyState {
    pub fn downcast_ref<S: State>(&self) -> Option<&S> {
        self.as_any().downcast_ref::<S>()
    }
}

/// Child snapshots keyed by their state id.
pub type SubStates = HashMap<String, Arc<dyn AnyState>>;

/// A state that holds child state snapshots.
pub trait ContainerState: State {
    fn sub_states(&self) -> &SubStates;

    fn sub_states_mut(&mut self) -> &mut SubStates;

    /// Store or refresh the snapshot of an attached child.
    fn update_sub_state<C>(&mut self, child: &C)
    where
        C: AttachableState<Parent = Self>,
    {
        self.sub_states_mut()
            .insert(child.state_id(), Arc::new(child.clone()));
    }

    fn sub_state<C: State>(&self, state_id: &str) -> Option<&C> {
        self.sub_states()
            .get(state_id)
            .and_then(|child| (**child).downcast_ref::<C>())
    }
}

/// A state that nests under a container state.
pub trait AttachableState: State {
    type Parent: ContainerState;
}

/// A state with a process-wide shared store, created on first access and
/// attached under its parent's shared store.
pub trait SharableState: AttachableState + Default {
    /// The process-wide store for this state, see [`Store::shared`].
    fn shared_store() -> Store<Self>
    where
        Self::Parent: SharedParent,
    {
        Store::shared()
    }
}

/// A state whose store binds one default action type.
pub trait ActionBindable: State {
    type BindAction: Action;
}

/// Terminal parent marker: a state with this parent is never attached.
#[derive(Debug, Clone)]
pub enum NoParent {}

impl State for NoParent {
    fn state_id(&self) -> String {
        match *self {}
    }
}

impl ContainerState for NoParent {
    fn sub_states(&self) -> &SubStates {
        match *self {}
    }

    fn sub_states_mut(&mut self) -> &mut SubStates {
        match *self {}
    }
}

/// A container that can receive shared children.
pub trait SharedParent: ContainerState {
    /// The shared store children attach to, `None` for [`NoParent`].
    fn shared_parent() -> Option<Store<Self>>;
}

impl SharedParent for NoParent {
    fn shared_parent() -> Option<Store<Self>> {
        None
    }
}

impl<C> SharedParent for C
where
    C: ContainerState + SharableState,
    C::Parent: SharedParent,
{
    fn shared_parent() -> Option<Store<Self>> {
        Some(Store::<C>::shared())
    }
}

/// Default root of the shared state tree.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub sub_states: SubStates,
}

impl State for AppState {}

impl ContainerState for AppState {
    fn sub_states(&self) -> &SubStates {
        &self.sub_states
    }

    fn sub_states_mut(&mut self) -> &mut SubStates {
        &mut self.sub_states
    }
}

impl AttachableState for AppState {
    type Parent = NoParent;
}

impl SharableState for AppState {}
