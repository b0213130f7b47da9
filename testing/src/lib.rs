//! # Isostate Testing
//!
//! Testing utilities and helpers for Isostate.
//!
//! This crate provides:
//! - In-process fakes for every host facility (navigation, devtools, hot reload)
//! - A Given-When-Then harness for reducers
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use isostate_testing::{FakeNavigation, RecordingDevtools};
//!
//! #[tokio::test]
//! async fn test_browser_store() {
//!     let navigation = FakeNavigation::new("/inbox");
//!     let devtools = Arc::new(RecordingDevtools::new());
//!     let host = HostEnvironment::browser(BuildProfile::Development, navigation.clone())
//!         .with_devtools(devtools.clone());
//!
//!     let configured = StoreFactory::new(create_reducer, root_saga(), host)
//!         .configure_store(AppState::default(), "/")?;
//!     assert_eq!(devtools.connect_count(), 1);
//! }
//! ```


pub use reducer_test::ReducerTest;

/// Fakes for the host facilities a store can be given.
pub mod mocks {
    use isostate_core::{
        BoxReducer, History, HistoryError, Location, NavigationBackend, PopCallback,
        ReducerError, ReducerFactory,
    };
    use isostate_runtime::{DevtoolsHook, HotReloadRuntime, ReloadHook};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NavigationState {
        entries: Vec<Location>,
        index: usize,
    }

    /// Browser navigation kept in memory.
    ///
    /// `go` completes synchronously by invoking the pop callback, the way a
    /// browser fires `popstate` after a traversal.
    ///
    /// # Example
    ///
    /// ```
    /// use isostate_core::{History, BrowserHistory};
    /// use isostate_testing::FakeNavigation;
    ///
    /// let navigation = FakeNavigation::new("/start");
    /// let history = BrowserHistory::new(navigation.clone()).unwrap();
    /// history.push("/next").unwrap();
    /// navigation.press_back();
    /// assert_eq!(history.location().pathname, "/start");
    /// ```
    pub struct FakeNavigation {
        state: Mutex<NavigationState>,
        on_pop: Mutex<Option<PopCallback>>,
        available: bool,
    }

    impl FakeNavigation {
        /// A browser showing `path`
        #[must_use]
        pub fn new(path: &str) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(NavigationState {
                    entries: vec![Location::parse(path)],
                    index: 0,
                }),
                on_pop: Mutex::new(None),
                available: true,
            })
        }

        /// A browser that cannot report its location
        #[must_use]
        pub fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(NavigationState {
                    entries: vec![Location::parse("/")],
                    index: 0,
                }),
                on_pop: Mutex::new(None),
                available: false,
            })
        }

        /// Simulate the user pressing the back button
        pub fn press_back(&self) {
            let _ = self.traverse(-1);
        }

        /// Simulate the user pressing the forward button
        pub fn press_forward(&self) {
            let _ = self.traverse(1);
        }

        /// Every entry recorded so far
        #[must_use]
        pub fn entries(&self) -> Vec<Location> {
            self.state.lock().entries.clone()
        }

        /// Index of the entry being shown
        #[must_use]
        pub fn index(&self) -> usize {
            self.state.lock().index
        }

        fn traverse(&self, delta: isize) -> Result<(), HistoryError> {
            let location = {
                let mut state = self.state.lock();
                let target = state
                    .index
                    .checked_add_signed(delta)
                    .filter(|target| *target < state.entries.len())
                    .ok_or_else(|| HistoryError::Navigation(format!("cannot go {delta}")))?;
                state.index = target;
                state.entries[target].clone()
            };

            if let Some(callback) = self.on_pop.lock().as_ref() {
                callback(location);
            }
            Ok(())
        }
    }

    impl NavigationBackend for FakeNavigation {
        fn current(&self) -> Result<Location, HistoryError> {
            if !self.available {
                return Err(HistoryError::BackendUnavailable);
            }
            let state = self.state.lock();
            Ok(state.entries[state.index].clone())
        }

        fn push_state(&self, location: &Location) -> Result<(), HistoryError> {
            let mut state = self.state.lock();
            let next = state.index + 1;
            state.entries.truncate(next);
            state.entries.push(location.clone());
            state.index = next;
            Ok(())
        }

        fn replace_state(&self, location: &Location) -> Result<(), HistoryError> {
            let mut state = self.state.lock();
            let index = state.index;
            state.entries[index] = location.clone();
            Ok(())
        }

        fn go(&self, delta: isize) -> Result<(), HistoryError> {
            self.traverse(delta)
        }

        fn length(&self) -> usize {
            self.state.lock().entries.len()
        }

        fn on_pop(&self, callback: PopCallback) {
            *self.on_pop.lock() = Some(callback);
        }
    }

    /// Devtools hook recording what it was shown.
    pub struct RecordingDevtools<A> {
        connects: AtomicUsize,
        actions: Mutex<Vec<A>>,
    }

    impl<A> RecordingDevtools<A> {
        /// A hook that has seen nothing yet
        #[must_use]
        pub const fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                actions: Mutex::new(Vec::new()),
            }
        }

        /// Number of stores connected
        #[must_use]
        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        /// Number of actions observed
        #[must_use]
        pub fn dispatch_count(&self) -> usize {
            self.actions.lock().len()
        }

        /// Check if the hook was never used
        #[must_use]
        pub fn is_untouched(&self) -> bool {
            self.connect_count() == 0 && self.dispatch_count() == 0
        }
    }

    impl<A: Clone> RecordingDevtools<A> {
        /// Actions observed, in order
        #[must_use]
        pub fn actions(&self) -> Vec<A> {
            self.actions.lock().clone()
        }
    }

    impl<A> Default for RecordingDevtools<A> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<S, A> DevtoolsHook<S, A> for RecordingDevtools<A>
    where
        A: Clone + Send,
    {
        fn connect(&self, _state: &S) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_dispatch(&self, action: &A, _state: &S) {
            self.actions.lock().push(action.clone());
        }
    }

    /// Hot-reload runtime driven by the test.
    pub struct ManualHotReload<S, A> {
        hooks: Mutex<Vec<ReloadHook<S, A>>>,
    }

    impl<S, A> ManualHotReload<S, A> {
        /// A runtime with no registered hook
        #[must_use]
        pub const fn new() -> Self {
            Self {
                hooks: Mutex::new(Vec::new()),
            }
        }

        /// Number of registered hooks
        #[must_use]
        pub fn hook_count(&self) -> usize {
            self.hooks.lock().len()
        }

        /// Simulate replacement of the reducer module
        pub fn swap(&self, factory: Arc<dyn ReducerFactory<S, A>>) {
            for hook in self.hooks.lock().iter() {
                hook(Arc::clone(&factory));
            }
        }
    }

    impl<S, A> Default for ManualHotReload<S, A> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<S, A> HotReloadRuntime<S, A> for ManualHotReload<S, A> {
        fn accept(&self, hook: ReloadHook<S, A>) {
            self.hooks.lock().push(hook);
        }
    }

    /// Reducer factory that never produces a reducer.
    #[derive(Debug, Clone)]
    pub struct FailingReducerFactory {
        message: String,
    }

    impl FailingReducerFactory {
        /// Fail with `message`
        #[must_use]
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }

    impl<S, A> ReducerFactory<S, A> for FailingReducerFactory {
        fn create(&self, _history: &Arc<dyn History>) -> Result<BoxReducer<S, A>, ReducerError> {
            Err(ReducerError::Load(self.message.clone()))
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Absolute request paths with an optional query string
    pub fn request_path() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-z0-9_-]{1,8}", 0..4),
            prop::option::of("[a-z]{1,5}=[a-z0-9]{0,5}"),
        )
            .prop_map(|(segments, query)| {
                let mut path = format!("/{}", segments.join("/"));
                if let Some(query) = query {
                    path.push('?');
                    path.push_str(&query);
                }
                path
            })
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FailingReducerFactory, FakeNavigation, ManualHotReload, RecordingDevtools};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use isostate_core::{BrowserHistory, History, Location};
    use isostate_runtime::DevtoolsHook;
    use proptest::prelude::*;

    #[test]
    fn test_fake_navigation_round_trip() {
        let navigation = FakeNavigation::new("/a");
        let history = BrowserHistory::new(navigation.clone()).unwrap();

        history.push("/b").unwrap();
        history.push("/c").unwrap();
        assert_eq!(navigation.entries().len(), 3);

        history.back().unwrap();
        assert_eq!(history.location().pathname, "/b");

        navigation.press_forward();
        assert_eq!(history.location().pathname, "/c");
        assert_eq!(navigation.index(), 2);
    }

    #[test]
    fn test_unavailable_navigation() {
        assert!(BrowserHistory::new(FakeNavigation::unavailable()).is_err());
    }

    #[test]
    fn test_recording_devtools() {
        let devtools = RecordingDevtools::<u8>::new();
        assert!(devtools.is_untouched());

        DevtoolsHook::<(), u8>::connect(&devtools, &());
        DevtoolsHook::<(), u8>::on_dispatch(&devtools, &7, &());

        assert_eq!(devtools.connect_count(), 1);
        assert_eq!(devtools.actions(), vec![7]);
    }

    proptest! {
        #[test]
        fn prop_request_paths_parse_absolute(path in properties::request_path()) {
            let location = Location::parse(&path);
            prop_assert!(location.pathname.starts_with('/'));
            prop_assert_eq!(location.href(), path);
        }
    }
}
