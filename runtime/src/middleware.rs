//! Middleware pipeline.
//!
//! Middleware sit between `dispatch` and the reducer. Each one receives the
//! signal and a [`Next`] continuation; calling `next.run(signal)` hands the
//! signal to the rest of the chain, not calling it swallows the signal.
//!
//! The store built by the factory always installs the chain
//! `[history sync, effect coordinator]`, so sagas observe a state in which
//! location changes triggered by the same action are already reduced.

use crate::error::StoreError;
use crate::saga::SagaMiddleware;
use crate::store::{Store, StoreInner};
use isostate_core::{History, ListenerId, Navigation, RoutedAction, Signal};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// An interceptor on the dispatch path.
pub trait Middleware<S, A>: Send + Sync {
    /// Called once the store exists, before any action is dispatched.
    fn attach(&self, _api: &MiddlewareApi<S, A>) {}

    /// Process a signal.
    ///
    /// # Errors
    ///
    /// Errors propagate back to the caller of `dispatch`.
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        signal: Signal<A>,
        next: Next<'_, S, A>,
    ) -> Result<(), StoreError>;
}

/// The remainder of the middleware chain
pub struct Next<'a, S, A> {
    api: &'a MiddlewareApi<S, A>,
    chain: &'a [Arc<dyn Middleware<S, A>>],
    store: &'a StoreInner<S, A>,
}

impl<'a, S, A> Next<'a, S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(
        api: &'a MiddlewareApi<S, A>,
        chain: &'a [Arc<dyn Middleware<S, A>>],
        store: &'a StoreInner<S, A>,
    ) -> Self {
        Self { api, chain, store }
    }

    /// Pass the signal on; the reducer runs after the last middleware.
    ///
    /// # Errors
    ///
    /// Returns whatever the downstream middleware report.
    pub fn run(self, signal: Signal<A>) -> Result<(), StoreError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                self.api,
                signal,
                Next {
                    api: self.api,
                    chain: rest,
                    store: self.store,
                },
            ),
            None => self.store.reduce_signal(signal),
        }
    }
}

/// Handle to the store given to middleware and sagas.
///
/// Holds the store weakly, so a middleware keeping its handle does not keep
/// the store alive.
pub struct MiddlewareApi<S, A> {
    store: Weak<StoreInner<S, A>>,
}

impl<S, A> Clone for MiddlewareApi<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Weak::clone(&self.store),
        }
    }
}

impl<S, A> std::fmt::Debug for MiddlewareApi<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareApi")
            .field("alive", &(self.store.strong_count() > 0))
            .finish()
    }
}

impl<S, A> MiddlewareApi<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(store: Weak<StoreInner<S, A>>) -> Self {
        Self { store }
    }

    /// Upgrade to a full store handle, if it is still alive
    #[must_use]
    pub fn store(&self) -> Option<Store<S, A>> {
        self.store.upgrade().map(|inner| Store { inner })
    }

    /// Dispatch from the top of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dropped`] if the store is gone, otherwise the
    /// result of [`Store::dispatch`].
    pub fn dispatch(&self, action: A) -> Result<(), StoreError> {
        self.store().ok_or(StoreError::Dropped)?.dispatch(action)
    }

    /// Dispatch a raw signal from the top of the chain.
    ///
    /// # Errors
    ///
    /// See [`MiddlewareApi::dispatch`].
    pub fn dispatch_signal(&self, signal: Signal<A>) -> Result<(), StoreError> {
        self.store().ok_or(StoreError::Dropped)?.dispatch_signal(signal)
    }

    /// Read the current state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dropped`] if the store is gone.
    pub fn state<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&S) -> T,
    {
        Ok(self.store().ok_or(StoreError::Dropped)?.state(f))
    }
}

/// Keeps a store and its history in step.
///
/// Navigation actions are carried out on the history and consumed. Every
/// history movement, whatever its origin, is dispatched back as
/// [`RoutedAction::location_changed`].
pub struct RouterMiddleware {
    history: Arc<dyn History>,
    listener: Mutex<Option<ListenerId>>,
}

impl RouterMiddleware {
    /// Create history sync for `history`
    #[must_use]
    pub fn new(history: Arc<dyn History>) -> Self {
        Self {
            history,
            listener: Mutex::new(None),
        }
    }

    fn navigate(&self, navigation: &Navigation) -> Result<(), StoreError> {
        tracing::debug!(?navigation, "Applying navigation");
        match navigation {
            Navigation::Push(path) => self.history.push(path),
            Navigation::Replace(path) => self.history.replace(path),
            Navigation::Go(delta) => self.history.go(*delta),
            Navigation::Back => self.history.back(),
            Navigation::Forward => self.history.forward(),
        }
        .map_err(StoreError::from)
    }
}

impl<S, A> Middleware<S, A> for RouterMiddleware
where
    S: Send + Sync + 'static,
    A: RoutedAction,
{
    fn attach(&self, api: &MiddlewareApi<S, A>) {
        let api = api.clone();
        let id = self.history.listen(Arc::new(move |change| {
            if let Err(error) = api.dispatch(A::location_changed(change.clone())) {
                tracing::warn!(%error, href = %change.location.href(), "Location change not dispatched");
            }
        }));

        if let Some(previous) = self.listener.lock().replace(id) {
            self.history.unlisten(previous);
        }
    }

    fn handle(
        &self,
        _api: &MiddlewareApi<S, A>,
        signal: Signal<A>,
        next: Next<'_, S, A>,
    ) -> Result<(), StoreError> {
        match signal.action().and_then(RoutedAction::navigation) {
            Some(navigation) => self.navigate(navigation),
            None => next.run(signal),
        }
    }
}

impl Drop for RouterMiddleware {
    fn drop(&mut self) {
        if let Some(id) = self.listener.get_mut().take() {
            self.history.unlisten(id);
        }
    }
}

/// The store's middleware chain, in order: history sync, then the
/// effect coordinator.
#[must_use]
pub fn build_middleware<S, A>(
    history: Arc<dyn History>,
    saga: Arc<SagaMiddleware<S, A>>,
) -> Vec<Arc<dyn Middleware<S, A>>>
where
    S: Send + Sync + 'static,
    A: RoutedAction,
{
    let router: Arc<dyn Middleware<S, A>> = Arc::new(RouterMiddleware::new(history));
    vec![router, saga]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use crate::enhancer::apply_middleware;
    use isostate_core::{LocationChange, MemoryHistory, Reducer};

    #[derive(Debug, Clone, Default)]
    struct TestState {
        path: String,
        seen: Vec<String>,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Navigate(Navigation),
        LocationChanged(LocationChange),
        Note(String),
    }

    impl RoutedAction for TestAction {
        fn navigation(&self) -> Option<&Navigation> {
            match self {
                Self::Navigate(nav) => Some(nav),
                _ => None,
            }
        }

        fn location_changed(change: LocationChange) -> Self {
            Self::LocationChanged(change)
        }
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;

        fn reduce(&self, state: &mut Self::State, action: Self::Action) {
            match action {
                TestAction::Navigate(_) => state.seen.push("navigate".to_string()),
                TestAction::LocationChanged(change) => {
                    state.path = change.location.href();
                    state.seen.push("changed".to_string());
                },
                TestAction::Note(note) => state.seen.push(note),
            }
        }
    }

    /// Records every signal it sees, then forwards it
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<TestState, TestAction> for Recorder {
        fn handle(
            &self,
            _api: &MiddlewareApi<TestState, TestAction>,
            signal: Signal<TestAction>,
            next: Next<'_, TestState, TestAction>,
        ) -> Result<(), StoreError> {
            self.log.lock().push(self.label.to_string());
            next.run(signal)
        }
    }

    /// Swallows everything
    struct Blackhole;

    impl Middleware<TestState, TestAction> for Blackhole {
        fn handle(
            &self,
            _api: &MiddlewareApi<TestState, TestAction>,
            _signal: Signal<TestAction>,
            _next: Next<'_, TestState, TestAction>,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn router_store(history: &Arc<dyn History>) -> Store<TestState, TestAction> {
        let router: Arc<dyn Middleware<TestState, TestAction>> =
            Arc::new(RouterMiddleware::new(Arc::clone(history)));
        Store::create(Box::new(TestReducer), TestState::default(), &apply_middleware(vec![router]))
            .unwrap()
    }

    #[test]
    fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware<TestState, TestAction>>> = vec![
            Arc::new(Recorder { label: "first", log: Arc::clone(&log) }),
            Arc::new(Recorder { label: "second", log: Arc::clone(&log) }),
        ];
        let store =
            Store::create(Box::new(TestReducer), TestState::default(), &apply_middleware(chain))
                .unwrap();

        store.dispatch(TestAction::Note("x".to_string())).unwrap();

        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(store.state(|s| s.seen.clone()), vec!["x"]);
    }

    #[test]
    fn test_middleware_can_swallow() {
        let blackhole: Arc<dyn Middleware<TestState, TestAction>> = Arc::new(Blackhole);
        let store = Store::create(
            Box::new(TestReducer),
            TestState::default(),
            &apply_middleware(vec![blackhole]),
        )
        .unwrap();

        store.dispatch(TestAction::Note("lost".to_string())).unwrap();
        assert!(store.state(|s| s.seen.is_empty()));
    }

    #[test]
    fn test_router_applies_navigation_and_reports_change() {
        let history: Arc<dyn History> = Arc::new(MemoryHistory::new("/"));
        let store = router_store(&history);

        store
            .dispatch(TestAction::Navigate(Navigation::Push("/a?b=1".to_string())))
            .unwrap();

        assert_eq!(history.location().href(), "/a?b=1");
        assert_eq!(store.state(|s| s.path.clone()), "/a?b=1");
        // the navigation request itself never reaches the reducer
        assert_eq!(store.state(|s| s.seen.clone()), vec!["changed"]);
    }

    #[test]
    fn test_router_reports_external_history_moves() {
        let history: Arc<dyn History> = Arc::new(MemoryHistory::new("/"));
        let store = router_store(&history);

        history.push("/elsewhere").unwrap();
        assert_eq!(store.state(|s| s.path.clone()), "/elsewhere");
    }

    #[test]
    fn test_router_stops_listening_when_store_dropped() {
        let history: Arc<dyn History> = Arc::new(MemoryHistory::new("/"));
        let store = router_store(&history);
        drop(store);

        // no listener left to dispatch into a dropped store
        history.push("/later").unwrap();
        assert_eq!(history.location().pathname, "/later");
    }

    #[test]
    fn test_api_reports_dropped_store() {
        let store = Store::create(
            Box::new(TestReducer),
            TestState::default(),
            &apply_middleware::<TestState, TestAction>(Vec::new()),
        )
        .unwrap();
        let api = store.api();
        drop(store);

        assert!(matches!(
            api.dispatch(TestAction::Note("late".to_string())),
            Err(StoreError::Dropped)
        ));
        assert!(api.state(|s| s.seen.len()).is_err());
    }
}
