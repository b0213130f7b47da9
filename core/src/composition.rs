//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Focus a reducer on a subset of state
//!
//! # Examples
//!
//! ```
//! use isostate_core::Reducer;
//! use isostate_core::composition::{combine_reducers, scope_reducer};
//!
//! #[derive(Default)]
//! struct AppState {
//!     hits: u32,
//!     session: Session,
//! }
//!
//! #[derive(Default)]
//! struct Session {
//!     user: Option<String>,
//! }
//!
//! #[derive(Clone)]
//! enum AppAction {
//!     Hit,
//!     Login(String),
//! }
//!
//! struct HitReducer;
//! struct SessionReducer;
//!
//! impl Reducer for HitReducer {
//!     type State = AppState;
//!     type Action = AppAction;
//!
//!     fn reduce(&self, state: &mut AppState, action: AppAction) {
//!         if matches!(action, AppAction::Hit) {
//!             state.hits += 1;
//!         }
//!     }
//! }
//!
//! impl Reducer for SessionReducer {
//!     type State = Session;
//!     type Action = AppAction;
//!
//!     fn reduce(&self, state: &mut Session, action: AppAction) {
//!         if let AppAction::Login(user) = action {
//!             state.user = Some(user);
//!         }
//!     }
//! }
//!
//! let combined = combine_reducers(vec![
//!     Box::new(HitReducer),
//!     Box::new(scope_reducer(SessionReducer, |s: &mut AppState| &mut s.session)),
//! ]);
//!
//! let mut state = AppState::default();
//! combined.reduce(&mut state, AppAction::Hit);
//! combined.reduce(&mut state, AppAction::Login("ada".into()));
//! assert_eq!(state.hits, 1);
//! assert_eq!(state.session.user.as_deref(), Some("ada"));
//! ```

use crate::reducer::{BoxReducer, Reducer, ReducerError};
use std::marker::PhantomData;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence with its own clone of the action.
/// Initialization runs every reducer's `init` in the same order and stops at
/// the first failure.
#[must_use]
pub fn combine_reducers<S, A>(reducers: Vec<BoxReducer<S, A>>) -> CombinedReducer<S, A>
where
    A: Clone,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A> {
    reducers: Vec<BoxReducer<S, A>>,
}

impl<S, A> Reducer for CombinedReducer<S, A>
where
    A: Clone,
{
    type State = S;
    type Action = A;

    fn init(&self, state: &mut S) -> Result<(), ReducerError> {
        self.reducers.iter().try_for_each(|reducer| reducer.init(state))
    }

    fn reduce(&self, state: &mut S, action: A) {
        for reducer in &self.reducers {
            reducer.reduce(state, action.clone());
        }
    }
}

/// Scopes a reducer to operate on a subset of a larger state.
///
/// `lens` borrows the child slice mutably out of the parent state, so the
/// slice is updated in place and the rest of the parent is untouched.
pub fn scope_reducer<S, SubS, A, R>(
    reducer: R,
    lens: fn(&mut S) -> &mut SubS,
) -> ScopedReducer<S, SubS, A, R>
where
    R: Reducer<State = SubS, Action = A>,
{
    ScopedReducer {
        reducer,
        lens,
        _action: PhantomData,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, R>
where
    R: Reducer<State = SubS, Action = A>,
{
    reducer: R,
    lens: fn(&mut S) -> &mut SubS,
    _action: PhantomData<fn(A)>,
}

impl<S, SubS, A, R> Reducer for ScopedReducer<S, SubS, A, R>
where
    R: Reducer<State = SubS, Action = A>,
{
    type State = S;
    type Action = A;

    fn init(&self, state: &mut S) -> Result<(), ReducerError> {
        self.reducer.init((self.lens)(state))
    }

    fn reduce(&self, state: &mut S, action: A) {
        self.reducer.reduce((self.lens)(state), action);
    }
}
