use super::store::{Store, SubscriptionKey};
use crate::cancel::{CancelHandle, Cancellable};
use crate::error::{StoreError, StoreResult};
use crate::graph::ObservationGraph;
use crate::monitor::{StoreEvent, StoreMonitor};
use crate::runtime::MainContext;
use crate::state::{Action, Field, FieldKey, State};

/// Cross-store observation. The subscribing store owns every subscription
/// it makes; they are cancelled when it is torn down.
impl<S: State> Store<S> {
    /// Run `callback(new, old)` whenever `target` replaces its state.
    ///
    /// Records the edge `self → target`; refused when it would close a cycle.
    pub fn observe<T, F>(&self, target: &Store<T>, callback: F) -> StoreResult<CancelHandle>
    where
        T: State,
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe(target, None, true, || target.add_observer(callback))
    }

    /// Apply the action produced from `target`'s new state on this store.
    pub fn observe_with_action<T, A, F>(
        &self,
        target: &Store<T>,
        make_action: F,
    ) -> StoreResult<CancelHandle>
    where
        T: State,
        A: Action,
        F: Fn(&T) -> Option<A> + Send + Sync + 'static,
    {
        let subscriber = self.downgrade();
        self.subscribe(target, None, true, || {
            target.add_observer(move |new, _old| {
                let Some(subscriber) = subscriber.upgrade() else {
                    return;
                };
                if let Some(action) = make_action(new) {
                    subscriber.apply(action);
                }
            })
        })
    }

    /// Run `callback(new, old)` when one field of `target` changes.
    ///
    /// No graph edge is recorded for field side effects, so cycles through
    /// this kind of subscription are not detected.
    pub fn observe_field<T, V, F>(
        &self,
        target: &Store<T>,
        field: &Field<T, V>,
        callback: F,
    ) -> StoreResult<CancelHandle>
    where
        T: State,
        V: PartialEq + 'static,
        F: Fn(&V, &V) + Send + Sync + 'static,
    {
        self.subscribe(target, Some(field.key()), false, || {
            target.add_field_observer(field, callback)
        })
    }

    /// Apply the action produced from a changed field of `target` on this
    /// store. Records the edge `self → target`.
    pub fn observe_field_with_action<T, V, A, F>(
        &self,
        target: &Store<T>,
        field: &Field<T, V>,
        make_action: F,
    ) -> StoreResult<CancelHandle>
    where
        T: State,
        V: PartialEq + 'static,
        A: Action,
        F: Fn(&V) -> Option<A> + Send + Sync + 'static,
    {
        let subscriber = self.downgrade();
        self.subscribe(target, Some(field.key()), true, || {
            target.add_field_observer(field, move |new, _old| {
                let Some(subscriber) = subscriber.upgrade() else {
                    return;
                };
                if let Some(action) = make_action(new) {
                    subscriber.apply(action);
                }
            })
        })
    }

    /// Drop the whole-state subscription on `target`. Returns whether one
    /// existed.
    pub fn unobserve<T: State>(&self, target: &Store<T>) -> bool {
        self.cancel_subscription((target.id(), None))
    }

    /// Drop the subscription on one field of `target`.
    pub fn unobserve_field<T: State, V>(&self, target: &Store<T>, field: &Field<T, V>) -> bool {
        self.cancel_subscription((target.id(), Some(field.key())))
    }

    /// Number of live cross-store subscriptions owned by this store.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    fn subscribe<T, L>(
        &self,
        target: &Store<T>,
        field: Option<FieldKey>,
        record_edge: bool,
        listen: L,
    ) -> StoreResult<CancelHandle>
    where
        T: State,
        L: FnOnce() -> Cancellable,
    {
        MainContext::check("observe");
        let (from, to) = (self.id(), target.id());
        let key: SubscriptionKey = (to, field);

        if self.inner.subscriptions.lock().contains_key(&key) {
            let field = field.map(|key| key.name());
            tracing::warn!(store = %from, target = %to, ?field, "duplicate subscription refused");
            let monitor = StoreMonitor::shared();
            monitor.record(|| StoreEvent::DuplicateSubscription {
                store: from,
                target: to,
                field,
            });
            let error = StoreError::DuplicateSubscription {
                store: from,
                target: to,
                field,
            };
            monitor.fatal(error.clone());
            return Err(error);
        }

        if record_edge {
            ObservationGraph::shared().record_edge(from, to)?;
        }

        let listener = listen();
        let subscriber = self.downgrade();
        let subscription = Cancellable::new(move || {
            listener.cancel();
            if record_edge {
                ObservationGraph::shared().remove_edge(from, to);
            }
            if let Some(subscriber) = subscriber.upgrade() {
                subscriber.inner.subscriptions.lock().remove(&key);
            }
            tracing::trace!(store = %from, target = %to, "subscription cancelled");
        });

        let handle = subscription.handle();
        self.inner.subscriptions.lock().insert(key, subscription);
        tracing::trace!(store = %from, target = %to, edge = record_edge, "subscription installed");
        Ok(handle)
    }

    fn cancel_subscription(&self, key: SubscriptionKey) -> bool {
        MainContext::check("unobserve");
        let subscription = self.inner.subscriptions.lock().remove(&key);
        match subscription {
            Some(subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }
}
