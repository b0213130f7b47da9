//! Environment-aware store assembly.
//!
//! [`StoreFactory::configure_store`] is the single entry point used by both
//! the browser bootstrap and the server request handler. It resolves the
//! history for the host, installs `[history sync, effect coordinator]`,
//! wraps them in devtools when allowed, and wires hot reload.
//!
//! # Example
//!
//! ```ignore
//! let factory = StoreFactory::new(create_root_reducer, root_saga(), HostEnvironment::server(profile));
//!
//! let ConfiguredStore { store, history } = factory.configure_store(AppState::default(), "/orders")?;
//! let root = store.run_saga(factory.root_saga())?;
//! let html = render(&store, &history);
//! store.settle(&root, Duration::from_secs(5)).await?;
//! ```

use crate::enhancer::{DevtoolsHook, apply_middleware, get_composer};
use crate::error::{SagaError, StoreError};
use crate::middleware::build_middleware;
use crate::saga::{Saga, SagaMiddleware, Task};
use crate::store::Store;
use isostate_core::{
    BuildProfile, EnvironmentMode, History, NavigationBackend, ReducerFactory, RoutedAction, Signal,
    StoreConfig, create_history,
};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Callback the hot-reload runtime invokes with the replacement reducer factory
pub type ReloadHook<S, A> = Box<dyn Fn(Arc<dyn ReducerFactory<S, A>>) + Send + Sync>;

/// Live module replacement offered by a development host.
pub trait HotReloadRuntime<S, A>: Send + Sync {
    /// Register the hook to call whenever the reducer module is replaced
    fn accept(&self, hook: ReloadHook<S, A>);
}

/// What the host offers the store.
///
/// # Example
///
/// ```ignore
/// let host = HostEnvironment::browser(BuildProfile::Development, Arc::new(WindowHistory::new()))
///     .with_devtools(Arc::new(ReduxDevtools::connect()))
///     .with_hot_reload(Arc::new(ModuleHot::current()));
/// ```
pub struct HostEnvironment<S, A> {
    /// Where the store runs
    pub mode: EnvironmentMode,
    /// Build profile of the host
    pub profile: BuildProfile,
    /// Live navigation, required in browser mode
    pub navigation: Option<Arc<dyn NavigationBackend>>,
    /// Development tooling hook
    pub devtools: Option<Arc<dyn DevtoolsHook<S, A>>>,
    /// Live module replacement
    pub hot_reload: Option<Arc<dyn HotReloadRuntime<S, A>>>,
}

impl<S, A> HostEnvironment<S, A> {
    /// A server process
    #[must_use]
    pub const fn server(profile: BuildProfile) -> Self {
        Self {
            mode: EnvironmentMode::Server,
            profile,
            navigation: None,
            devtools: None,
            hot_reload: None,
        }
    }

    /// A browser with live navigation
    #[must_use]
    pub fn browser(profile: BuildProfile, navigation: Arc<dyn NavigationBackend>) -> Self {
        Self {
            mode: EnvironmentMode::Browser,
            profile,
            navigation: Some(navigation),
            devtools: None,
            hot_reload: None,
        }
    }

    /// Resolve mode and profile from configuration.
    ///
    /// Browser facilities must be added with the `with_*` builders.
    #[must_use]
    pub fn detect(config: &StoreConfig) -> Self {
        let mode = config.environment_mode();
        tracing::debug!(%mode, profile = %config.profile, "Detected host environment");
        Self {
            mode,
            profile: config.profile,
            navigation: None,
            devtools: None,
            hot_reload: None,
        }
    }

    /// Set the live navigation backend
    #[must_use]
    pub fn with_navigation(mut self, navigation: Arc<dyn NavigationBackend>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Set the devtools hook
    #[must_use]
    pub fn with_devtools(mut self, devtools: Arc<dyn DevtoolsHook<S, A>>) -> Self {
        self.devtools = Some(devtools);
        self
    }

    /// Set the hot-reload runtime
    #[must_use]
    pub fn with_hot_reload(mut self, hot_reload: Arc<dyn HotReloadRuntime<S, A>>) -> Self {
        self.hot_reload = Some(hot_reload);
        self
    }
}

impl<S, A> Clone for HostEnvironment<S, A> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            profile: self.profile,
            navigation: self.navigation.clone(),
            devtools: self.devtools.clone(),
            hot_reload: self.hot_reload.clone(),
        }
    }
}

impl<S, A> std::fmt::Debug for HostEnvironment<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("mode", &self.mode)
            .field("profile", &self.profile)
            .field("navigation", &self.navigation.is_some())
            .field("devtools", &self.devtools.is_some())
            .field("hot_reload", &self.hot_reload.is_some())
            .finish()
    }
}

/// Builds one store per call, wired for the host.
pub struct StoreFactory<S, A> {
    reducers: Arc<dyn ReducerFactory<S, A>>,
    root_saga: Saga<S, A>,
    host: HostEnvironment<S, A>,
    default_path: String,
}

impl<S, A> StoreFactory<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: RoutedAction,
{
    /// Create a factory for an application's reducer and root saga
    pub fn new<F>(reducer_factory: F, root_saga: Saga<S, A>, host: HostEnvironment<S, A>) -> Self
    where
        F: ReducerFactory<S, A> + 'static,
    {
        Self {
            reducers: Arc::new(reducer_factory),
            root_saga,
            host,
            default_path: "/".to_string(),
        }
    }

    /// Path used by [`StoreFactory::configure_default_store`]
    #[must_use]
    pub fn with_default_path(mut self, path: impl Into<String>) -> Self {
        self.default_path = path.into();
        self
    }

    /// The root saga, for explicit runs on the server
    #[must_use]
    pub const fn root_saga(&self) -> &Saga<S, A> {
        &self.root_saga
    }

    /// The host this factory builds for
    #[must_use]
    pub const fn host(&self) -> &HostEnvironment<S, A> {
        &self.host
    }

    /// Build a store and its history.
    ///
    /// On the server the history holds only `initial_path` and the root saga
    /// is left for the caller to start with [`AppStore::run_saga`]. In the
    /// browser the history follows the host and the root saga starts here.
    ///
    /// # Errors
    ///
    /// - [`StoreError::History`] if the browser host has no navigation backend
    /// - [`StoreError::Reducer`] if the reducer cannot be built or initialized
    /// - [`StoreError::Saga`] if the root saga cannot be started in the browser
    pub fn configure_store(
        &self,
        initial_state: S,
        initial_path: &str,
    ) -> Result<ConfiguredStore<S, A>, StoreError> {
        let HostEnvironment { mode, profile, .. } = self.host;
        let span = tracing::info_span!("configure_store", %mode, %profile);
        let _enter = span.enter();

        let history = create_history(mode, initial_path, self.host.navigation.clone())?;

        let saga = Arc::new(SagaMiddleware::new());
        let middleware = build_middleware(Arc::clone(&history), Arc::clone(&saga));

        let composer = get_composer(profile, mode, self.host.devtools.clone());
        tracing::debug!(?composer, "Selected enhancer composer");
        let enhancer = composer.compose(Box::new(apply_middleware(middleware)));

        let reducer = self.reducers.create(&history)?;
        let store = Store::create(reducer, initial_state, enhancer.as_ref())?;

        let root_task = if mode.is_browser() {
            Some(saga.run(&self.root_saga)?)
        } else {
            None
        };

        if let Some(runtime) = &self.host.hot_reload {
            if profile.is_production() {
                tracing::debug!("Hot reload not wired in production");
            } else {
                runtime.accept(reload_hook(&store, &history));
                tracing::debug!("Hot reload wired");
            }
        }

        tracing::info!(href = %history.location().href(), "Store configured");

        Ok(ConfiguredStore {
            store: AppStore {
                store,
                saga,
                root_task,
            },
            history,
        })
    }

    /// Build a store from the default state at the default path.
    ///
    /// # Errors
    ///
    /// See [`StoreFactory::configure_store`].
    pub fn configure_default_store(&self) -> Result<ConfiguredStore<S, A>, StoreError>
    where
        S: Default,
    {
        self.configure_store(S::default(), &self.default_path)
    }
}

fn reload_hook<S, A>(store: &Store<S, A>, history: &Arc<dyn History>) -> ReloadHook<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    let api = store.api();
    let history = Arc::clone(history);

    Box::new(move |factory: Arc<dyn ReducerFactory<S, A>>| {
        let Some(store) = api.store() else {
            tracing::debug!("Hot reload skipped; store dropped");
            return;
        };

        let replaced = factory
            .create(&history)
            .map_err(StoreError::from)
            .and_then(|reducer| store.replace_reducer(reducer));

        match replaced {
            Ok(()) => tracing::info!("Hot reload applied"),
            Err(error) => tracing::warn!(%error, "Hot reload failed; keeping previous reducer"),
        }
    })
}

/// What [`StoreFactory::configure_store`] returns
pub struct ConfiguredStore<S, A> {
    /// The store, with its saga lifecycle
    pub store: AppStore<S, A>,
    /// The history the store is synchronized with
    pub history: Arc<dyn History>,
}

impl<S, A> std::fmt::Debug for ConfiguredStore<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredStore")
            .field("store", &self.store)
            .field("location", &self.history.location())
            .finish()
    }
}

/// A configured store.
///
/// Dereferences to [`Store`] and adds the saga lifecycle.
pub struct AppStore<S, A> {
    store: Store<S, A>,
    saga: Arc<SagaMiddleware<S, A>>,
    root_task: Option<Task>,
}

impl<S, A> Clone for AppStore<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            saga: Arc::clone(&self.saga),
            root_task: self.root_task.clone(),
        }
    }
}

impl<S, A> Deref for AppStore<S, A> {
    type Target = Store<S, A>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl<S, A> std::fmt::Debug for AppStore<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStore")
            .field("store", &self.store)
            .field("root_task", &self.root_task)
            .finish_non_exhaustive()
    }
}

impl<S, A> AppStore<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Start a saga against this store.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::NoRuntime`] outside of a tokio runtime.
    pub fn run_saga(&self, saga: &Saga<S, A>) -> Result<Task, SagaError> {
        self.saga.run(saga)
    }

    /// Dispatch the termination signal.
    ///
    /// Every `take` waiting now or later ends its saga. Calling this more
    /// than once, or after the sagas have stopped, does nothing.
    pub fn close(&self) {
        if let Err(error) = self.store.dispatch_signal(Signal::End) {
            tracing::warn!(%error, "Closing store failed");
        }
    }

    /// Check if the store was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.saga.is_closed()
    }

    /// The root task started at construction in browser mode
    #[must_use]
    pub const fn root_task(&self) -> Option<&Task> {
        self.root_task.as_ref()
    }

    /// Close the store and wait for `task`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Timeout`] if the task outlives `timeout`, or the
    /// failure that ended it.
    pub async fn settle(&self, task: &Task, timeout: Duration) -> Result<(), SagaError> {
        self.close();
        task.wait_with_timeout(timeout).await
    }
}
