use std::any::{self, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::config::{ConfigPair, StoreConfig};
use super::draft::Draft;
use super::storage::Storage;
use crate::cancel::Cancellable;
use crate::depender::{DependerId, Directory};
use crate::error::StoreError;
use crate::monitor::{StoreEvent, StoreMonitor};
use crate::runtime::{MainContext, StoreId};
use crate::state::{short_type_name, Action, ActionBindable, Field, FieldKey, State};

/// Entry point an action came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceFrom {
    /// User-triggered, on the main context.
    Send,
    /// Generated by the engine or another store, on the main context.
    Apply,
    /// Scheduled onto the main context from anywhere.
    Dispatch,
}

type Reduce<S> = Box<dyn Fn(&mut Draft<S>, &dyn Action) + Send + Sync>;
type Listener<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;
type DestroyCallback<S> = Box<dyn FnOnce(S) + Send>;

/// Key of one cross-store subscription: observed store and optional field.
pub(crate) type SubscriptionKey = (StoreId, Option<FieldKey>);

struct RegisteredReducer<S> {
    dependers: Vec<DependerId>,
    reduce: Reduce<S>,
}

struct Observer<S> {
    id: u64,
    listener: Listener<S>,
}

enum ReducePhase {
    Idle,
    Reducing { action: &'static str },
}

/// Work waiting for the running reduce to finish.
enum Pending<S> {
    Action {
        action: Box<dyn Action>,
        from: ReduceFrom,
    },
    /// Engine-internal whole-state update, such as a child snapshot sync.
    Mutate(Box<dyn FnOnce(&mut S) + Send>),
}

/// Label used in diagnostics for queued internal updates.
const INTERNAL_UPDATE: &str = "internal update";

impl<S> Pending<S> {
    fn label(&self) -> &'static str {
        match self {
            Pending::Action { action, .. } => action.action_name(),
            Pending::Mutate(_) => INTERNAL_UPDATE,
        }
    }
}

struct ReduceQueue<S> {
    phase: ReducePhase,
    pending: VecDeque<Pending<S>>,
}

/// Puts a store back to idle when a reducer or observer panics mid-reduce,
/// dropping whatever was still queued.
struct ResetOnUnwind<'a, S> {
    queue: &'a Mutex<ReduceQueue<S>>,
}

impl<S> Drop for ResetOnUnwind<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut queue = self.queue.lock();
            queue.phase = ReducePhase::Idle;
            queue.pending.clear();
        }
    }
}

pub(crate) struct Inner<S: State> {
    id: StoreId,
    state: RwLock<S>,
    reducers: Mutex<HashMap<TypeId, Arc<RegisteredReducer<S>>>>,
    observers: Mutex<Vec<Observer<S>>>,
    field_observers: Mutex<HashMap<FieldKey, Vec<Observer<S>>>>,
    next_observer_id: AtomicU64,
    reduce: Mutex<ReduceQueue<S>>,
    pub(super) subscriptions: Mutex<HashMap<SubscriptionKey, Cancellable>>,
    destroy_callback: Mutex<Option<DestroyCallback<S>>>,
    pub(super) storage: Mutex<Storage>,
    pub(super) config: StoreConfig,
}

/// The exclusive owner of a state value.
///
/// State changes go through actions: `send` and `apply` reduce synchronously,
/// `dispatch` hops onto the [`MainContext`]. Reduces on one store are
/// serialized: an action submitted while another is being reduced waits in a
/// FIFO queue until the running reduce and its notifications are done.
///
/// `Store` is a cheap handle; clones share the same store. The store is torn
/// down when the last handle drops.
///
/// # Examples
///
/// ```
/// use flowstore::{Action, State, Store};
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter {
///     count: i64,
/// }
/// impl State for Counter {}
///
/// #[derive(Debug)]
/// struct Increment;
/// impl Action for Increment {}
///
/// let store = Store::new(Counter::default());
/// store.register(|state, _: &Increment| state.count += 1);
///
/// store.send(Increment);
/// store.send(Increment);
/// assert_eq!(store.get().count, 2);
/// ```
pub struct Store<S: State> {
    pub(super) inner: Arc<Inner<S>>,
}

/// Non-owning store handle, for callbacks that must not keep a store alive.
pub struct WeakStore<S: State> {
    inner: Weak<Inner<S>>,
}

impl<S: State> WeakStore<S> {
    pub fn upgrade(&self) -> Option<Store<S>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<S: State> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: State> Store<S> {
    /// Wrap a state in a new store. The state's reducer hook is not run.
    pub fn new(initial: S) -> Self {
        Self::with_config(initial, Vec::new())
    }

    /// Like [`new`](Self::new), with initial configuration readable through
    /// [`config`](Self::config). A later pair for the same key wins.
    pub fn with_config(initial: S, pairs: Vec<ConfigPair>) -> Self {
        let id = StoreId::next();
        let state_type = short_type_name(any::type_name::<S>());
        tracing::trace!(store = %id, state = state_type, "store created");
        StoreMonitor::shared().record(|| StoreEvent::CreateStore {
            store: id,
            state: state_type,
        });

        Self {
            inner: Arc::new(Inner {
                id,
                state: RwLock::new(initial),
                reducers: Mutex::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                field_observers: Mutex::new(HashMap::new()),
                next_observer_id: AtomicU64::new(0),
                reduce: Mutex::new(ReduceQueue {
                    phase: ReducePhase::Idle,
                    pending: VecDeque::new(),
                }),
                subscriptions: Mutex::new(HashMap::new()),
                destroy_callback: Mutex::new(None),
                storage: Mutex::new(Storage::default()),
                config: StoreConfig::new(pairs),
            }),
        }
    }

    /// Wrap a state in a new store and run [`State::load_reducers`] on it.
    pub fn boxed(initial: S) -> Self {
        let store = Self::new(initial);
        S::load_reducers(&store);
        store
    }

    /// Like [`boxed`](Self::boxed). The configuration is already readable
    /// from [`State::load_reducers`].
    pub fn boxed_with_config(initial: S, pairs: Vec<ConfigPair>) -> Self {
        let store = Self::with_config(initial, pairs);
        S::load_reducers(&store);
        store
    }

    /// A primed store over `S::default()`.
    pub fn init() -> Self
    where
        S: Default,
    {
        Self::boxed(S::default())
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store<S>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- reading ----

    /// Get a clone of the current state.
    pub fn get(&self) -> S {
        self.inner.state.read().clone()
    }

    /// Read state without cloning. The closure must not write to this store.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Clone one field out of the current state.
    pub fn field<T: Clone>(&self, field: &Field<S, T>) -> Option<T> {
        self.read(|state| field.get(state).cloned())
    }

    pub fn state_id(&self) -> String {
        self.read(|state| state.state_id())
    }

    // ---- reducers ----

    /// Register the reducer for action type `A`, replacing any previous one.
    pub fn register<A, F>(&self, reducer: F)
    where
        A: Action,
        F: Fn(&mut Draft<S>, &A) + Send + Sync + 'static,
    {
        self.register_with_dependers(&[], reducer)
    }

    /// Register a reducer gated by the listed dependers.
    pub fn register_with_dependers<A, F>(&self, dependers: &[DependerId], reducer: F)
    where
        A: Action,
        F: Fn(&mut Draft<S>, &A) + Send + Sync + 'static,
    {
        MainContext::check("register");
        let reduce: Reduce<S> = Box::new(move |draft: &mut Draft<S>, action: &dyn Action| {
            if let Some(action) = action.downcast_ref::<A>() {
                reducer(draft, action);
            }
        });
        let entry = Arc::new(RegisteredReducer {
            dependers: dependers.to_vec(),
            reduce,
        });
        let replaced = self
            .inner
            .reducers
            .lock()
            .insert(TypeId::of::<A>(), entry)
            .is_some();
        tracing::trace!(
            store = %self.id(),
            action = any::type_name::<A>(),
            replaced,
            "reducer registered"
        );
    }

    pub fn has_reducer<A: Action>(&self) -> bool {
        self.inner.reducers.lock().contains_key(&TypeId::of::<A>())
    }

    // ---- actions ----

    /// Reduce a user-triggered action now.
    pub fn send<A: Action>(&self, action: A) {
        MainContext::check("send");
        self.reduce(Box::new(action), ReduceFrom::Send);
    }

    /// Reduce an internally generated action now.
    pub fn apply<A: Action>(&self, action: A) {
        MainContext::check("apply");
        self.reduce(Box::new(action), ReduceFrom::Apply);
    }

    /// Schedule the action onto the main context. Callable from any thread.
    pub fn dispatch<A: Action>(&self, action: A) {
        self.dispatch_with(action, || {});
    }

    /// Like [`dispatch`](Self::dispatch), then run `completion` on the main
    /// context once the reduce is done.
    pub fn dispatch_with<A, F>(&self, action: A, completion: F)
    where
        A: Action,
        F: FnOnce() + Send + 'static,
    {
        let store = self.clone();
        MainContext::global().spawn(move || {
            store.reduce(Box::new(action), ReduceFrom::Dispatch);
            completion();
        });
    }

    fn reduce(&self, action: Box<dyn Action>, from: ReduceFrom) {
        self.run_or_queue(Pending::Action { action, from });
    }

    /// Run `work` now when the store is idle, or queue it behind the reduce
    /// in progress.
    fn run_or_queue(&self, work: Pending<S>) {
        let label = work.label();
        let is_action = matches!(work, Pending::Action { .. });
        let busy_with = {
            let mut queue = self.inner.reduce.lock();
            let current = match &queue.phase {
                ReducePhase::Reducing { action } => Some(*action),
                ReducePhase::Idle => None,
            };
            match current {
                Some(current) => {
                    queue.pending.push_back(work);
                    Err(current)
                }
                None => {
                    queue.phase = ReducePhase::Reducing { action: label };
                    Ok(work)
                }
            }
        };

        let work = match busy_with {
            Ok(work) => work,
            Err(current) => {
                tracing::trace!(store = %self.id(), current, queued = label, "reduce in progress, work queued");
                if is_action {
                    StoreMonitor::shared().record(|| StoreEvent::ReduceInOtherReduce {
                        store: self.id(),
                        current,
                        queued: label,
                    });
                }
                return;
            }
        };

        let _reset = ResetOnUnwind {
            queue: &self.inner.reduce,
        };
        let mut next = Some(work);
        while let Some(work) = next.take() {
            match work {
                Pending::Action { action, from } => self.reduce_one(&*action, from),
                Pending::Mutate(mutate) => {
                    let mut state = self.get();
                    mutate(&mut state);
                    self.update_state_with_notice(state, None);
                }
            }

            let mut queue = self.inner.reduce.lock();
            next = queue.pending.pop_front();
            queue.phase = match &next {
                Some(pending) => ReducePhase::Reducing {
                    action: pending.label(),
                },
                None => ReducePhase::Idle,
            };
        }
    }

    fn reduce_one(&self, action: &dyn Action, from: ReduceFrom) {
        let store = self.id();
        let action_name = action.action_name();
        let monitor = StoreMonitor::shared();
        tracing::trace!(%store, action = action_name, ?from, "reduce");
        monitor.record(|| StoreEvent::BeforeReduce {
            store,
            from,
            action: action_name,
        });

        let reducer = self
            .inner
            .reducers
            .lock()
            .get(&action.as_any().type_id())
            .cloned();

        let Some(reducer) = reducer else {
            tracing::debug!(%store, action = action_name, "no reducer registered, action dropped");
            monitor.record(|| StoreEvent::ReduceNotRegistered {
                store,
                from,
                action: action_name,
            });
            monitor.record(|| StoreEvent::AfterReduce {
                store,
                from,
                action: action_name,
                changed: false,
            });
            return;
        };

        let current = self.get();
        if !Directory::shared().check_dependency(&reducer.dependers, &current, action) {
            tracing::debug!(%store, action = action_name, "depender gate refused reduce");
            monitor.record(|| StoreEvent::ReduceRejected {
                store,
                from,
                action: action_name,
            });
            return;
        }

        let mut draft = Draft::new(current);
        (reducer.reduce)(&mut draft, action);
        let changed = draft.is_written();
        monitor.record(|| StoreEvent::AfterReduce {
            store,
            from,
            action: action_name,
            changed,
        });

        if changed {
            self.update_state_with_notice(draft.into_inner(), None);
        }
    }

    // ---- direct writes ----

    /// Replace the whole state without an action. Reported in strict mode.
    pub fn set_state(&self, state: S) {
        self.will_update_directly(None);
        self.update_state_with_notice(state, None);
    }

    /// Modify a copy of the state and replace it. Reported in strict mode.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut S),
    {
        self.will_update_directly(None);
        let mut state = self.get();
        f(&mut state);
        self.update_state_with_notice(state, None);
    }

    /// Write one field. Nothing is replaced or notified when the value is
    /// unchanged or the field does not resolve. Reported in strict mode.
    pub fn set_field<T: PartialEq>(&self, field: &Field<S, T>, value: T) {
        self.will_update_directly(Some(field.key()));
        let mut state = self.get();
        let Some(slot) = field.get_mut(&mut state) else {
            return;
        };
        if *slot == value {
            return;
        }
        *slot = value;
        self.update_state_with_notice(state, Some(field.key()));
    }

    fn will_update_directly(&self, field: Option<FieldKey>) {
        let monitor = StoreMonitor::shared();
        monitor.record(|| StoreEvent::WillDirectUpdate {
            store: self.id(),
            field: field.map(|key| key.name()),
        });
        if monitor.is_strict_mode() {
            monitor.fatal(StoreError::DirectUpdateInStrictMode { store: self.id() });
        }
    }

    /// Engine-internal whole-state update, exempt from strict mode.
    ///
    /// Serialized with reduces: while one is in flight the update waits in
    /// the queue, so the reducer's draft cannot overwrite it.
    pub(crate) fn mutate_internal<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.run_or_queue(Pending::Mutate(Box::new(f)));
    }

    fn update_state_with_notice(&self, new: S, field: Option<FieldKey>) {
        let old = std::mem::replace(&mut *self.inner.state.write(), new.clone());
        tracing::trace!(store = %self.id(), field = ?field.map(|key| key.name()), "state updated");
        StoreMonitor::shared().record(|| StoreEvent::DidUpdateState {
            store: self.id(),
            field: field.map(|key| key.name()),
        });

        let listeners: Vec<Listener<S>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|observer| Arc::clone(&observer.listener))
            .collect();
        for listener in listeners {
            listener(&new, &old);
        }

        let field_listeners: Vec<Listener<S>> = {
            let field_observers = self.inner.field_observers.lock();
            match field {
                Some(key) => field_observers
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .map(|observer| Arc::clone(&observer.listener))
                    .collect(),
                None => field_observers
                    .values()
                    .flatten()
                    .map(|observer| Arc::clone(&observer.listener))
                    .collect(),
            }
        };
        for listener in field_listeners {
            listener(&new, &old);
        }
    }

    // ---- observers ----

    fn next_observer_id(&self) -> u64 {
        self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Observe every state replacement with `(new, old)`.
    ///
    /// Fires on each replace, even when the new value equals the old one.
    pub fn add_observer<F>(&self, callback: F) -> Cancellable
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        let id = self.next_observer_id();
        self.inner.observers.lock().push(Observer {
            id,
            listener: Arc::new(callback),
        });

        let store = self.downgrade();
        Cancellable::new(move || {
            if let Some(store) = store.upgrade() {
                store.inner.observers.lock().retain(|observer| observer.id != id);
            }
        })
    }

    /// Observe one field with `(new, old)`, only when its value changes.
    pub fn add_field_observer<T, F>(&self, field: &Field<S, T>, callback: F) -> Cancellable
    where
        T: PartialEq + 'static,
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = self.next_observer_id();
        let key = field.key();
        let field = *field;
        let listener: Listener<S> = Arc::new(move |new: &S, old: &S| {
            if let (Some(new), Some(old)) = (field.get(new), field.get(old)) {
                if new != old {
                    callback(new, old);
                }
            }
        });
        self.inner
            .field_observers
            .lock()
            .entry(key)
            .or_default()
            .push(Observer { id, listener });

        let store = self.downgrade();
        Cancellable::new(move || {
            let Some(store) = store.upgrade() else {
                return;
            };
            let mut field_observers = store.inner.field_observers.lock();
            if let Some(observers) = field_observers.get_mut(&key) {
                observers.retain(|observer| observer.id != id);
                if observers.is_empty() {
                    field_observers.remove(&key);
                }
            }
        })
    }

    /// Number of whole-state observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Number of observers on one field.
    pub fn field_observer_count<T>(&self, field: &Field<S, T>) -> usize {
        self.inner
            .field_observers
            .lock()
            .get(&field.key())
            .map_or(0, Vec::len)
    }

    // ---- teardown ----

    /// Run `callback` with the final state when the store is torn down.
    /// Replaces any previous destroy callback.
    pub fn set_destroy_callback<F>(&self, callback: F)
    where
        F: FnOnce(S) + Send + 'static,
    {
        *self.inner.destroy_callback.lock() = Some(Box::new(callback));
    }
}

impl<S: ActionBindable> Store<S> {
    /// Register the reducer for the state's bound action type.
    pub fn register_default<F>(&self, dependers: &[DependerId], reducer: F)
    where
        F: Fn(&mut Draft<S>, &S::BindAction) + Send + Sync + 'static,
    {
        self.register_with_dependers(dependers, reducer);
    }
}

impl<S: State + Default> Default for Store<S> {
    fn default() -> Self {
        Self::init()
    }
}

impl<S: State> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: State> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Store");
        debug.field("id", &self.inner.id);
        match self.inner.state.try_read() {
            Some(state) => debug.field("state", &*state),
            None => debug.field("state", &"<locked>"),
        };
        debug.finish()
    }
}

impl<S: State> Drop for Inner<S> {
    fn drop(&mut self) {
        let store = self.id;
        let state_type = short_type_name(any::type_name::<S>());
        tracing::trace!(%store, state = state_type, "store destroyed");
        StoreMonitor::shared().record(|| StoreEvent::DestroyStore {
            store,
            state: state_type,
        });

        let subscriptions = std::mem::take(self.subscriptions.get_mut());
        for (_, subscription) in subscriptions {
            subscription.cancel();
        }

        if let Some(callback) = self.destroy_callback.get_mut().take() {
            callback(self.state.get_mut().clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depender::Depender;
    use crate::field;
    use crate::state::AnyState;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Default)]
    struct AppState {
        count: usize,
        name: String,
    }

    impl State for AppState {}

    #[derive(Debug)]
    struct Increment;
    impl Action for Increment {}

    #[derive(Debug)]
    struct Touch;
    impl Action for Touch {}

    #[derive(Debug)]
    struct Rename(String);
    impl Action for Rename {}

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn set_state_replaces_and_passes_old_value() {
        let store = Store::new(AppState {
            count: 1,
            name: "before".to_string(),
        });
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _guard = store.add_observer(move |new, old| {
            s.lock().push((old.name.clone(), new.name.clone()));
        });

        store.set_state(AppState {
            count: 2,
            name: "after".to_string(),
        });

        assert_eq!(store.read(|state| state.count), 2);
        assert_eq!(
            *seen.lock(),
            vec![("before".to_string(), "after".to_string())]
        );
    }

    #[test]
    fn update_goes_through_notification() {
        let store = Store::new(AppState::default());
        let counts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let c = Arc::clone(&counts);
        let _guard = store.add_observer(move |new, old| c.lock().push((old.count, new.count)));

        store.update(|state| state.count += 10);
        store.update(|_| {});

        assert_eq!(store.get().count, 10);
        // A closure that changes nothing still replaces the state.
        assert_eq!(*counts.lock(), vec![(0, 10), (10, 10)]);
    }

    #[test]
    fn cancelled_observer_stops_firing() {
        let store = Store::new(AppState::default());
        let (calls, bump) = counter();
        let guard = store.add_observer(move |_, _| bump());
        assert_eq!(store.observer_count(), 1);

        store.update(|state| state.count += 1);
        guard.cancel();
        store.update(|state| state.count += 1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn increment_three_times() {
        let store = Store::new(AppState::default());
        store.register(|state, _: &Increment| state.count += 1);
        let (calls, bump) = counter();
        let _guard = store.add_observer(move |_, _| bump());

        store.send(Increment);
        store.send(Increment);
        store.send(Increment);

        assert_eq!(store.get().count, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn reducers_are_per_store() {
        let first = Store::new(AppState::default());
        let second = Store::new(AppState::default());
        first.register(|state, _: &Increment| state.count += 1);
        second.register(|state, _: &Increment| state.count += 100);

        first.send(Increment);
        assert_eq!(first.get().count, 1);
        assert_eq!(second.get().count, 0);
    }

    #[test]
    fn reregister_replaces() {
        let store = Store::new(AppState::default());
        store.register(|state, _: &Increment| state.count += 1);
        store.register(|state, _: &Increment| state.count += 5);
        assert!(store.has_reducer::<Increment>());
        assert!(!store.has_reducer::<Touch>());

        store.send(Increment);
        assert_eq!(store.get().count, 5);
    }

    #[test]
    fn unregistered_action_is_dropped_and_reported() {
        let store = Store::new(AppState::default());
        let id = store.id();
        let (dropped, bump) = counter();
        let _monitor = StoreMonitor::shared().add_observer(move |event| {
            if let StoreEvent::ReduceNotRegistered { store, from, .. } = event {
                if *store == id && *from == ReduceFrom::Apply {
                    bump();
                }
            }
        });
        let (notified, notify) = counter();
        let _guard = store.add_observer(move |_, _| notify());

        store.apply(Touch);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(), AppState::default());
    }

    #[test]
    fn any_write_notifies_whole_state_observers() {
        let store = Store::new(AppState::default());
        store.register(|state, _: &Touch| state.name = String::new());
        let (whole, bump_whole) = counter();
        let _whole = store.add_observer(move |_, _| bump_whole());
        let (named, bump_named) = counter();
        let _named = store.add_field_observer(&field!(AppState, name), move |_, _| bump_named());

        store.send(Touch);
        assert_eq!(whole.load(Ordering::SeqCst), 1);
        assert_eq!(named.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn untouched_draft_does_not_notify() {
        let store = Store::new(AppState::default());
        store.register(|state, _: &Touch| {
            let _count = state.count;
        });
        let (whole, bump) = counter();
        let _guard = store.add_observer(move |_, _| bump());

        store.send(Touch);
        assert_eq!(whole.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn field_observer_fires_on_change_only() {
        let store = Store::new(AppState::default());
        store.register(|state, action: &Rename| state.name = action.0.clone());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let guard = store.add_field_observer(&field!(AppState, name), move |new, old| {
            s.lock().push((old.clone(), new.clone()));
        });

        store.send(Rename("x".to_string()));
        store.send(Rename("x".to_string()));
        store.send(Rename("y".to_string()));
        assert_eq!(
            *seen.lock(),
            vec![
                (String::new(), "x".to_string()),
                ("x".to_string(), "y".to_string()),
            ]
        );

        guard.cancel();
        store.send(Rename("z".to_string()));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn targeted_field_write_only_notifies_that_field() {
        let store = Store::new(AppState::default());
        let (named, bump_named) = counter();
        let _named = store.add_field_observer(&field!(AppState, name), move |_, _| bump_named());
        let (counted, bump_counted) = counter();
        let _counted = store.add_field_observer(&field!(AppState, count), move |_, _| bump_counted());

        store.set_field(&field!(AppState, name), "text".to_string());
        assert_eq!(named.load(Ordering::SeqCst), 1);
        assert_eq!(counted.load(Ordering::SeqCst), 0);
        assert_eq!(store.field(&field!(AppState, name)), Some("text".to_string()));
    }

    #[test]
    fn equal_field_write_is_skipped() {
        let store = Store::new(AppState::default());
        let (whole, bump) = counter();
        let _guard = store.add_observer(move |_, _| bump());

        store.set_field(&field!(AppState, name), String::new());
        assert_eq!(whole.load(Ordering::SeqCst), 0);

        store.set_field(&field!(AppState, name), "text".to_string());
        assert_eq!(whole.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn whole_state_write_notifies_changed_fields() {
        let store = Store::new(AppState::default());
        let (named, bump_named) = counter();
        let _named = store.add_field_observer(&field!(AppState, name), move |_, _| bump_named());
        let (counted, bump_counted) = counter();
        let _counted = store.add_field_observer(&field!(AppState, count), move |_, _| bump_counted());

        store.update(|state| state.count = 9);
        assert_eq!(named.load(Ordering::SeqCst), 0);
        assert_eq!(counted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_looking_observers_are_independent() {
        let store = Store::new(AppState::default());
        let (calls, bump) = counter();
        let bump = Arc::new(bump);
        let b1 = Arc::clone(&bump);
        let first = store.add_observer(move |_, _| b1());
        let b2 = Arc::clone(&bump);
        let _second = store.add_observer(move |_, _| b2());
        assert_eq!(store.observer_count(), 2);

        first.cancel();
        first.cancel();
        assert_eq!(store.observer_count(), 1);
        store.update(|state| state.count += 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_actions_run_fifo_after_current() {
        #[derive(Clone, Debug, Default)]
        struct Log {
            entries: Vec<&'static str>,
        }
        impl State for Log {}

        #[derive(Debug)]
        struct First;
        impl Action for First {}
        #[derive(Debug)]
        struct Second;
        impl Action for Second {}
        #[derive(Debug)]
        struct Third;
        impl Action for Third {}

        let store = Store::new(Log::default());
        let weak = store.downgrade();
        store.register(move |state, _: &First| {
            state.entries.push("first");
            if let Some(store) = weak.upgrade() {
                store.send(Second);
                store.apply(Third);
                assert!(store.get().entries.is_empty());
            }
            state.entries.push("first-done");
        });
        store.register(|state, _: &Second| state.entries.push("second"));
        store.register(|state, _: &Third| state.entries.push("third"));

        let id = store.id();
        let (queued, bump) = counter();
        let _monitor = StoreMonitor::shared().add_observer(move |event| {
            if let StoreEvent::ReduceInOtherReduce { store, .. } = event {
                if *store == id {
                    bump();
                }
            }
        });

        store.send(First);
        assert_eq!(
            store.get().entries,
            vec!["first", "first-done", "second", "third"]
        );
        assert_eq!(queued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn actions_from_observers_wait_for_notification() {
        let store = Store::new(AppState::default());
        store.register(|state, _: &Increment| state.count += 1);
        store.register(|state, action: &Rename| state.name = action.0.clone());

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let weak = store.downgrade();
        let o = Arc::clone(&order);
        let _first = store.add_observer(move |new, _| {
            o.lock().push(format!("first:{}:{}", new.count, new.name));
            if new.count == 1 && new.name.is_empty() {
                if let Some(store) = weak.upgrade() {
                    store.apply(Rename("after".to_string()));
                }
            }
        });
        let o = Arc::clone(&order);
        let _second = store.add_observer(move |new, _| {
            o.lock().push(format!("second:{}:{}", new.count, new.name));
        });

        store.send(Increment);
        assert_eq!(
            *order.lock(),
            vec![
                "first:1:".to_string(),
                "second:1:".to_string(),
                "first:1:after".to_string(),
                "second:1:after".to_string(),
            ]
        );
    }

    struct Gate {
        open: AtomicBool,
    }

    impl Depender for Gate {
        fn depender_id(&self) -> DependerId {
            DependerId::from_static("store-unit-gate")
        }

        fn can_reduce(&self, state: &dyn AnyState, action: &dyn Action) -> bool {
            assert!(state.downcast_ref::<AppState>().is_some());
            assert!(action.is::<Increment>());
            self.open.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn gated_reducer() {
        let gate = Arc::new(Gate {
            open: AtomicBool::new(false),
        });
        Directory::shared().register(Arc::clone(&gate)).unwrap();

        let store = Store::new(AppState::default());
        store.register_with_dependers(&[DependerId::from("store-unit-gate")], |state, _: &Increment| {
            state.count += 1
        });
        let (notified, bump) = counter();
        let _guard = store.add_observer(move |_, _| bump());

        store.send(Increment);
        assert_eq!(store.get().count, 0);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        gate.open.store(true, Ordering::SeqCst);
        store.send(Increment);
        assert_eq!(store.get().count, 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_runs_on_main_context() {
        let store = Store::new(AppState::default());
        let reduced_on_main = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reduced_on_main);
        store.register(move |state, _: &Increment| {
            state.count += 1;
            flag.store(MainContext::is_current(), Ordering::SeqCst);
        });

        let (tx, rx) = crossbeam_channel::bounded(1);
        let remote = store.clone();
        std::thread::spawn(move || {
            remote.dispatch_with(Increment, move || {
                let _ = tx.send(MainContext::is_current());
            });
        })
        .join()
        .unwrap();

        let completion_on_main = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(completion_on_main);
        assert!(reduced_on_main.load(Ordering::SeqCst));
        assert_eq!(store.get().count, 1);
    }

    #[test]
    fn panicking_reducer_leaves_store_usable() {
        #[derive(Debug)]
        struct Boom;
        impl Action for Boom {}

        let store = Store::new(AppState::default());
        store.register(|_, _: &Boom| panic!("reducer failed"));
        store.register(|state, _: &Increment| state.count += 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| store.send(Boom)));
        assert!(result.is_err());

        store.send(Increment);
        assert_eq!(store.get().count, 1);
    }

    #[test]
    fn destroy_callback_gets_final_state() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let s = Arc::clone(&seen);
        let store = Store::new(AppState::default());
        store.set_destroy_callback(move |state: AppState| {
            *s.lock() = Some(state.count);
        });
        store.update(|state| state.count = 7);

        let other = store.clone();
        drop(store);
        assert!(seen.lock().is_none());
        drop(other);
        assert_eq!(*seen.lock(), Some(7));
    }

    #[test]
    fn cancel_after_store_is_gone() {
        let store = Store::new(AppState::default());
        let guard = store.add_observer(|_, _| {});
        let field_guard = store.add_field_observer(&field!(AppState, count), |_, _| {});
        drop(store);
        guard.cancel();
        field_guard.cancel();
    }
}
