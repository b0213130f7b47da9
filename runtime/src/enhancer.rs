//! Store enhancers.
//!
//! An enhancer transforms a [`StoreBuilder`] before the store is built. The
//! middleware chain is installed by one enhancer; development tooling wraps
//! that enhancer through a [`Composer`].

use crate::middleware::Middleware;
use crate::store::StoreBuilder;
use isostate_core::{BuildProfile, EnvironmentMode};
use std::sync::Arc;

/// Transforms a store under construction.
pub trait Enhancer<S, A>: Send + Sync {
    /// Return the builder with this enhancer's additions
    fn enhance(&self, builder: StoreBuilder<S, A>) -> StoreBuilder<S, A>;
}

/// Development tooling attached to a store.
///
/// Implemented by the host's devtools binding.
pub trait DevtoolsHook<S, A>: Send + Sync {
    /// Called once with the initial state
    fn connect(&self, state: &S);

    /// Called after every reduced action with the resulting state
    fn on_dispatch(&self, action: &A, state: &S);
}

/// Enhancer installing a middleware chain, in order
pub struct MiddlewareEnhancer<S, A> {
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
}

impl<S, A> Enhancer<S, A> for MiddlewareEnhancer<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn enhance(&self, builder: StoreBuilder<S, A>) -> StoreBuilder<S, A> {
        self.middleware
            .iter()
            .fold(builder, |builder, middleware| builder.with_middleware(Arc::clone(middleware)))
    }
}

/// Build the enhancer for a middleware chain
#[must_use]
pub fn apply_middleware<S, A>(middleware: Vec<Arc<dyn Middleware<S, A>>>) -> MiddlewareEnhancer<S, A> {
    MiddlewareEnhancer { middleware }
}

struct DevtoolsEnhancer<S, A> {
    inner: Box<dyn Enhancer<S, A>>,
    hook: Arc<dyn DevtoolsHook<S, A>>,
}

impl<S, A> Enhancer<S, A> for DevtoolsEnhancer<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn enhance(&self, builder: StoreBuilder<S, A>) -> StoreBuilder<S, A> {
        self.inner.enhance(builder).with_monitor(Arc::clone(&self.hook))
    }
}

/// Combines enhancers, optionally instrumenting them for devtools.
pub enum Composer<S, A> {
    /// Plain composition
    Identity,
    /// Composition reporting to a devtools hook
    Devtools(Arc<dyn DevtoolsHook<S, A>>),
}

impl<S, A> Composer<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Apply the composer to an enhancer
    #[must_use]
    pub fn compose(&self, enhancer: Box<dyn Enhancer<S, A>>) -> Box<dyn Enhancer<S, A>> {
        match self {
            Self::Identity => enhancer,
            Self::Devtools(hook) => Box::new(DevtoolsEnhancer {
                inner: enhancer,
                hook: Arc::clone(hook),
            }),
        }
    }

    /// Check if devtools instrumentation is active
    #[must_use]
    pub const fn is_devtools(&self) -> bool {
        matches!(self, Self::Devtools(_))
    }
}

impl<S, A> std::fmt::Debug for Composer<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Devtools(_) => f.write_str("Devtools"),
        }
    }
}

/// Pick the composer for a host.
///
/// Devtools are used only outside production, in a browser, and when the
/// host provides a hook.
#[must_use]
pub fn get_composer<S, A>(
    profile: BuildProfile,
    mode: EnvironmentMode,
    hook: Option<Arc<dyn DevtoolsHook<S, A>>>,
) -> Composer<S, A> {
    match hook {
        Some(hook) if !profile.is_production() && mode.is_browser() => Composer::Devtools(hook),
        _ => Composer::Identity,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use crate::store::Store;
    use isostate_core::Reducer;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        count: u32,
    }

    #[derive(Debug, Clone)]
    struct Bump;

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Counter;
        type Action = Bump;

        fn reduce(&self, state: &mut Counter, _action: Bump) {
            state.count += 1;
        }
    }

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<String>>,
    }

    impl DevtoolsHook<Counter, Bump> for Log {
        fn connect(&self, state: &Counter) {
            self.events.lock().push(format!("connect {}", state.count));
        }

        fn on_dispatch(&self, _action: &Bump, state: &Counter) {
            self.events.lock().push(format!("dispatch {}", state.count));
        }
    }

    fn hook() -> (Arc<Log>, Option<Arc<dyn DevtoolsHook<Counter, Bump>>>) {
        let log = Arc::new(Log::default());
        let hook: Arc<dyn DevtoolsHook<Counter, Bump>> = Arc::clone(&log) as _;
        (log, Some(hook))
    }

    #[test]
    fn test_composer_selection() {
        use BuildProfile::{Development, Production};
        use EnvironmentMode::{Browser, Server};

        assert!(get_composer(Development, Browser, hook().1).is_devtools());
        assert!(!get_composer(Production, Browser, hook().1).is_devtools());
        assert!(!get_composer(Development, Server, hook().1).is_devtools());
        assert!(!get_composer::<Counter, Bump>(Development, Browser, None).is_devtools());
    }

    #[test]
    fn test_devtools_observes_store() {
        let (log, hook) = hook();
        let composer = get_composer(BuildProfile::Development, EnvironmentMode::Browser, hook);
        let enhancer = composer.compose(Box::new(apply_middleware::<Counter, Bump>(Vec::new())));

        let store = Store::create(Box::new(CounterReducer), Counter::default(), enhancer.as_ref())
            .unwrap();
        store.dispatch(Bump).unwrap();

        assert_eq!(*log.events.lock(), vec!["connect 0", "dispatch 1"]);
    }

    #[test]
    fn test_identity_leaves_enhancer_alone() {
        let (log, hook) = hook();
        let composer = get_composer(BuildProfile::Production, EnvironmentMode::Browser, hook);
        let enhancer = composer.compose(Box::new(apply_middleware::<Counter, Bump>(Vec::new())));

        let store = Store::create(Box::new(CounterReducer), Counter::default(), enhancer.as_ref())
            .unwrap();
        store.dispatch(Bump).unwrap();

        assert!(log.events.lock().is_empty());
        assert_eq!(store.state(|s| s.count), 1);
    }
}
