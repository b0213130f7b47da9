//! Shared fixtures for the store integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

use isostate_core::{
    BoxReducer, BuildProfile, History, LocationChange, Navigation, Reducer, ReducerError,
    RoutedAction, RouterState,
};
use isostate_runtime::{HostEnvironment, Saga, SagaContext, StoreFactory};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub router: RouterState,
    pub visits: u32,
    pub started: bool,
    pub greeting: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Navigate(Navigation),
    LocationChanged(LocationChange),
    Started,
    Visit,
    Greet(String),
}

impl RoutedAction for AppAction {
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

/// Reducer counting visits by `step`
pub struct AppReducer {
    history: Arc<dyn History>,
    step: u32,
}

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;

    fn init(&self, state: &mut AppState) -> Result<(), ReducerError> {
        state.router = RouterState::from_history(self.history.as_ref());
        if state.greeting.is_empty() {
            state.greeting = "hello".to_string();
        }
        Ok(())
    }

    fn reduce(&self, state: &mut AppState, action: AppAction) {
        match action {
            AppAction::Navigate(_) => {},
            AppAction::LocationChanged(change) => state.router.apply(change),
            AppAction::Started => state.started = true,
            AppAction::Visit => state.visits += self.step,
            AppAction::Greet(greeting) => state.greeting = greeting,
        }
    }
}

pub fn create_reducer(
    history: &Arc<dyn History>,
) -> Result<BoxReducer<AppState, AppAction>, ReducerError> {
    Ok(Box::new(AppReducer {
        history: Arc::clone(history),
        step: 1,
    }))
}

pub fn create_doubling_reducer(
    history: &Arc<dyn History>,
) -> Result<BoxReducer<AppState, AppAction>, ReducerError> {
    Ok(Box::new(AppReducer {
        history: Arc::clone(history),
        step: 2,
    }))
}

/// Announces itself, then greets every visit until the store closes
pub fn root_saga() -> Saga<AppState, AppAction> {
    Saga::new("root", |ctx: SagaContext<AppState, AppAction>| async move {
        ctx.put(AppAction::Started)?;
        loop {
            ctx.take(|a| *a == AppAction::Visit).await?;
            let visits = ctx.select(|s| s.visits)?;
            ctx.put(AppAction::Greet(format!("visit {visits}")))?;
        }
    })
}

pub fn server_factory(profile: BuildProfile) -> StoreFactory<AppState, AppAction> {
    StoreFactory::new(create_reducer, root_saga(), HostEnvironment::server(profile))
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F>(check: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
