//! Store runtime for coordinating reducer execution and subscribers.
//!
//! The store owns the state tree, the active reducer, the middleware chain
//! and the subscriber registry. Every dispatch runs under a per-store
//! reentrant gate, so actions reach middleware and the reducer in a single
//! global order while middleware and subscribers on the dispatching thread
//! may still dispatch follow-up actions.

use crate::enhancer::{DevtoolsHook, Enhancer};
use crate::error::StoreError;
use crate::middleware::{Middleware, MiddlewareApi, Next};
use isostate_core::{BoxReducer, Signal};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Callback invoked after every reduced action
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`Store::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) struct StoreInner<S, A> {
    state: RwLock<S>,
    reducer: RwLock<BoxReducer<S, A>>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    monitors: Vec<Arc<dyn DevtoolsHook<S, A>>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_listener: AtomicU64,
    gate: ReentrantMutex<()>,
    reducing: AtomicBool,
}

/// Guard that clears the reducing flag on drop, even if the reducer panics
struct ReducingGuard<'a>(&'a AtomicBool);

impl<'a> ReducingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ReducingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S, A> StoreInner<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn dispatch_signal(self: &Arc<Self>, signal: Signal<A>) -> Result<(), StoreError> {
        let _gate = self.gate.lock();
        if self.reducing.load(Ordering::Acquire) {
            tracing::warn!("Rejected dispatch from inside a reducer");
            return Err(StoreError::DispatchInReducer);
        }

        metrics::counter!("store.dispatch.total").increment(1);
        tracing::trace!(end = signal.is_end(), "Dispatching");

        let api = MiddlewareApi::new(Arc::downgrade(self));
        Next::new(&api, &self.middleware, self).run(signal)
    }

    /// End of the middleware chain: apply the reducer and notify.
    pub(crate) fn reduce_signal(&self, signal: Signal<A>) -> Result<(), StoreError> {
        let Signal::Action(action) = signal else {
            tracing::debug!("Termination signal reached the base store");
            return Ok(());
        };

        let observed = (!self.monitors.is_empty()).then(|| action.clone());

        {
            let reducer = self.reducer.read();
            let mut state = self.state.write();
            let _reducing = ReducingGuard::enter(&self.reducing);

            let span = tracing::trace_span!("reducer_execution");
            let _enter = span.enter();
            reducer.reduce(&mut state, action);
        }

        if let Some(action) = observed {
            let state = self.state.read();
            for monitor in &self.monitors {
                monitor.on_dispatch(&action, &state);
            }
        }

        self.notify_listeners();
        Ok(())
    }

    fn notify_listeners(&self) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener();
        }
    }
}

/// The Store - central state container
///
/// Cloning a store yields another handle to the same state.
///
/// # Example
///
/// ```ignore
/// let store = Store::create(reducer, AppState::default(), &apply_middleware(vec![]))?;
///
/// let id = store.subscribe(|| println!("state changed"));
/// store.dispatch(AppAction::Refresh)?;
/// let count = store.state(|s| s.items.len());
/// store.unsubscribe(id);
/// ```
pub struct Store<S, A> {
    pub(crate) inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> std::fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("middleware", &self.inner.middleware.len())
            .field("monitors", &self.inner.monitors.len())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S, A> Store<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Build a store from a reducer, its initial state, and an enhancer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reducer`] if the reducer rejects the initial
    /// state; construction is one-shot and not retried.
    pub fn create(
        reducer: BoxReducer<S, A>,
        initial_state: S,
        enhancer: &dyn Enhancer<S, A>,
    ) -> Result<Self, StoreError> {
        enhancer.enhance(StoreBuilder::new(reducer, initial_state)).build()
    }

    /// Send an action through the middleware chain to the reducer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DispatchInReducer`] when called from inside a
    /// reducer, or whatever a middleware reports (e.g. a history failure).
    pub fn dispatch(&self, action: A) -> Result<(), StoreError> {
        self.inner.dispatch_signal(Signal::Action(action))
    }

    /// Send a raw signal, including the termination sentinel.
    ///
    /// # Errors
    ///
    /// See [`Store::dispatch`].
    pub fn dispatch_signal(&self, signal: Signal<A>) -> Result<(), StoreError> {
        self.inner.dispatch_signal(signal)
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let order_count = store.state(|s| s.orders.len());
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Register a listener called after every reduced action.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Swap the active reducer without discarding state.
    ///
    /// The new reducer's `init` runs against a copy of the current state.
    /// Only when it succeeds are the reducer and the initialized copy
    /// installed; values the new reducer does not touch are carried over.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reducer`] if the new reducer rejects the state;
    /// the previous reducer and state stay active.
    pub fn replace_reducer(&self, reducer: BoxReducer<S, A>) -> Result<(), StoreError>
    where
        S: Clone,
    {
        let _gate = self.inner.gate.lock();
        if self.inner.reducing.load(Ordering::Acquire) {
            return Err(StoreError::DispatchInReducer);
        }

        let mut next_state = self.inner.state.read().clone();
        if let Err(error) = reducer.init(&mut next_state) {
            tracing::warn!(%error, "Replacement reducer rejected the current state");
            return Err(error.into());
        }

        *self.inner.state.write() = next_state;
        *self.inner.reducer.write() = reducer;

        metrics::counter!("store.reducer.replaced").increment(1);
        tracing::info!("Reducer replaced");

        self.inner.notify_listeners();
        Ok(())
    }

    /// Weak handle to this store, as handed to middleware
    #[must_use]
    pub fn api(&self) -> MiddlewareApi<S, A> {
        MiddlewareApi::new(Arc::downgrade(&self.inner))
    }
}

/// Store under construction.
///
/// Enhancers receive the builder and add middleware or monitors to it.
pub struct StoreBuilder<S, A> {
    reducer: BoxReducer<S, A>,
    state: S,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    monitors: Vec<Arc<dyn DevtoolsHook<S, A>>>,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Start from a reducer and its initial state
    #[must_use]
    pub fn new(reducer: BoxReducer<S, A>, initial_state: S) -> Self {
        Self {
            reducer,
            state: initial_state,
            middleware: Vec::new(),
            monitors: Vec::new(),
        }
    }

    /// Append a middleware; earlier middleware sees actions first
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware<S, A>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Add a monitor observing every reduced action
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn DevtoolsHook<S, A>>) -> Self {
        self.monitors.push(monitor);
        self
    }

    /// Number of middleware installed so far
    #[must_use]
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Initialize state, then mount middleware and monitors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reducer`] if the reducer's `init` fails.
    pub fn build(self) -> Result<Store<S, A>, StoreError> {
        let mut state = self.state;
        self.reducer.init(&mut state)?;

        let store = Store {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                reducer: RwLock::new(self.reducer),
                middleware: self.middleware,
                monitors: self.monitors,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                gate: ReentrantMutex::new(()),
                reducing: AtomicBool::new(false),
            }),
        };

        let api = store.api();
        for middleware in &store.inner.middleware {
            middleware.attach(&api);
        }

        {
            let state = store.inner.state.read();
            for monitor in &store.inner.monitors {
                monitor.connect(&state);
            }
        }

        tracing::debug!(
            middleware = store.inner.middleware.len(),
            monitors = store.inner.monitors.len(),
            "Store created"
        );

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use crate::enhancer::apply_middleware;
    use isostate_core::{Reducer, ReducerError};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TestState {
        value: i32,
        label: String,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        Label(String),
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;

        fn reduce(&self, state: &mut Self::State, action: Self::Action) {
            match action {
                TestAction::Increment => state.value += 1,
                TestAction::Decrement => state.value -= 1,
                TestAction::Label(label) => state.label = label,
            }
        }
    }

    struct DoublingReducer;

    impl Reducer for DoublingReducer {
        type State = TestState;
        type Action = TestAction;

        fn init(&self, state: &mut Self::State) -> Result<(), ReducerError> {
            if state.label.is_empty() {
                state.label = "doubled".to_string();
            }
            Ok(())
        }

        fn reduce(&self, state: &mut Self::State, action: Self::Action) {
            match action {
                TestAction::Increment => state.value += 2,
                TestAction::Decrement => state.value -= 2,
                TestAction::Label(label) => state.label = label,
            }
        }
    }

    struct BrokenReducer;

    impl Reducer for BrokenReducer {
        type State = TestState;
        type Action = TestAction;

        fn init(&self, _state: &mut Self::State) -> Result<(), ReducerError> {
            Err(ReducerError::Init("missing slice".to_string()))
        }

        fn reduce(&self, state: &mut Self::State, _action: Self::Action) {
            state.value = i32::MIN;
        }
    }

    fn test_store() -> Store<TestState, TestAction> {
        Store::create(
            Box::new(TestReducer),
            TestState::default(),
            &apply_middleware::<TestState, TestAction>(Vec::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_store_creation() {
        let store = test_store();
        assert_eq!(store.state(|s| s.value), 0);
    }

    #[test]
    fn test_multiple_actions() {
        let store = test_store();

        store.dispatch(TestAction::Increment).unwrap();
        store.dispatch(TestAction::Increment).unwrap();
        store.dispatch(TestAction::Decrement).unwrap();

        assert_eq!(store.state(|s| s.value), 1);
    }

    #[test]
    fn test_store_clone_shares_state() {
        let store1 = test_store();
        let store2 = store1.clone();

        store1.dispatch(TestAction::Increment).unwrap();
        assert_eq!(store2.state(|s| s.value), 1);
    }

    #[test]
    fn test_failing_init_is_fatal() {
        let result = Store::create(
            Box::new(BrokenReducer),
            TestState::default(),
            &apply_middleware::<TestState, TestAction>(Vec::new()),
        );
        assert!(matches!(result, Err(StoreError::Reducer(ReducerError::Init(_)))));
    }

    #[test]
    fn test_subscribers_notified_until_unsubscribed() {
        let store = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let id = store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(TestAction::Increment).unwrap();
        assert!(store.unsubscribe(id));
        store.dispatch(TestAction::Increment).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_end_skips_reducer_and_subscribers() {
        let store = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch_signal(Signal::End).unwrap();
        store.dispatch_signal(Signal::End).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.state(Clone::clone), TestState::default());
    }

    #[test]
    fn test_subscriber_may_dispatch() {
        let store = test_store();
        let inner = store.clone();

        store.subscribe(move || {
            if inner.state(|s| s.value) == 1 {
                inner.dispatch(TestAction::Label("one".to_string())).unwrap();
            }
        });

        store.dispatch(TestAction::Increment).unwrap();
        assert_eq!(store.state(|s| s.label.clone()), "one");
    }

    #[test]
    fn test_replace_reducer_preserves_state() {
        let store = test_store();
        store.dispatch(TestAction::Increment).unwrap();
        store.dispatch(TestAction::Label("kept".to_string())).unwrap();

        store.replace_reducer(Box::new(DoublingReducer)).unwrap();
        assert_eq!(store.state(|s| (s.value, s.label.clone())), (1, "kept".to_string()));

        store.dispatch(TestAction::Increment).unwrap();
        assert_eq!(store.state(|s| s.value), 3);
    }

    #[test]
    fn test_failed_replacement_keeps_previous_reducer() {
        let store = test_store();
        store.dispatch(TestAction::Increment).unwrap();

        let result = store.replace_reducer(Box::new(BrokenReducer));
        assert!(matches!(result, Err(StoreError::Reducer(_))));

        store.dispatch(TestAction::Increment).unwrap();
        assert_eq!(store.state(|s| s.value), 2);
    }

    type Slot = Arc<std::sync::OnceLock<Store<TestState, TestAction>>>;

    /// Tries to dispatch from inside `reduce` and records the outcome
    struct ReentrantReducer {
        store: Slot,
        outcome: Arc<Mutex<Option<Result<(), StoreError>>>>,
    }

    impl Reducer for ReentrantReducer {
        type State = TestState;
        type Action = TestAction;

        fn reduce(&self, state: &mut Self::State, action: Self::Action) {
            if let TestAction::Increment = action {
                state.value += 1;
                if let Some(store) = self.store.get() {
                    *self.outcome.lock() = Some(store.dispatch(TestAction::Decrement));
                }
            }
        }
    }

    #[test]
    fn test_dispatch_from_reducer_is_rejected() {
        let slot: Slot = Arc::default();
        let outcome = Arc::new(Mutex::new(None));
        let reducer = ReentrantReducer {
            store: Arc::clone(&slot),
            outcome: Arc::clone(&outcome),
        };
        let store = Store::create(
            Box::new(reducer),
            TestState::default(),
            &apply_middleware::<TestState, TestAction>(Vec::new()),
        )
        .unwrap();
        slot.set(store.clone()).unwrap();

        store.dispatch(TestAction::Increment).unwrap();

        assert!(matches!(*outcome.lock(), Some(Err(StoreError::DispatchInReducer))));
        assert_eq!(store.state(|s| s.value), 1);

        // the store is usable again afterwards
        store.dispatch(TestAction::Decrement).unwrap();
        assert_eq!(store.state(|s| s.value), 0);
    }

    #[test]
    fn test_concurrent_dispatches_are_serialized() {
        let store = test_store();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.dispatch(TestAction::Increment).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.state(|s| s.value), 800);
    }
}
