//! Reducer module - the state-transition contract
//!
//! Reducers are synchronous: `(State, Action) → State`, applied in place.
//! Asynchronous work belongs to sagas running on the store, not here.

use crate::history::History;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or initializing a reducer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReducerError {
    /// The reducer rejected the state it was initialized with
    #[error("Reducer initialization failed: {0}")]
    Init(String),

    /// A replacement reducer could not be produced
    #[error("Reducer could not be loaded: {0}")]
    Load(String),
}

/// The Reducer trait - core abstraction for state transitions
///
/// # Example
///
/// ```
/// use isostate_core::Reducer;
///
/// #[derive(Default)]
/// struct Counter {
///     count: i64,
/// }
///
/// enum CounterAction {
///     Increment,
///     Reset,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = Counter;
///     type Action = CounterAction;
///
///     fn reduce(&self, state: &mut Counter, action: CounterAction) {
///         match action {
///             CounterAction::Increment => state.count += 1,
///             CounterAction::Reset => state.count = 0,
///         }
///     }
/// }
///
/// let mut state = Counter::default();
/// CounterReducer.reduce(&mut state, CounterAction::Increment);
/// assert_eq!(state.count, 1);
/// ```
pub trait Reducer: Send + Sync {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// Prepare `state` before the first action.
    ///
    /// Runs once when a store is built and again when this reducer replaces
    /// another one. Fill in missing slices here; leave everything else alone.
    ///
    /// # Errors
    ///
    /// Returns [`ReducerError::Init`] if the state cannot be used.
    fn init(&self, _state: &mut Self::State) -> Result<(), ReducerError> {
        Ok(())
    }

    /// Apply an action to the state.
    fn reduce(&self, state: &mut Self::State, action: Self::Action);
}

/// Boxed reducer, the form a store holds and swaps
pub type BoxReducer<S, A> = Box<dyn Reducer<State = S, Action = A>>;

impl<S, A> Reducer for BoxReducer<S, A> {
    type State = S;
    type Action = A;

    fn init(&self, state: &mut S) -> Result<(), ReducerError> {
        (**self).init(state)
    }

    fn reduce(&self, state: &mut S, action: A) {
        (**self).reduce(state, action);
    }
}

/// Builds the application reducer for a particular history.
///
/// Implemented for closures:
///
/// ```
/// use isostate_core::{BoxReducer, History, Reducer, ReducerError, ReducerFactory};
/// use std::sync::Arc;
///
/// struct Noop;
///
/// impl Reducer for Noop {
///     type State = ();
///     type Action = ();
///     fn reduce(&self, _state: &mut (), _action: ()) {}
/// }
///
/// let factory = |_history: &Arc<dyn History>| -> Result<BoxReducer<(), ()>, ReducerError> {
///     Ok(Box::new(Noop))
/// };
/// # fn assert_factory<F: ReducerFactory<(), ()>>(_: &F) {}
/// # assert_factory(&factory);
/// ```
pub trait ReducerFactory<S, A>: Send + Sync {
    /// Create the reducer.
    ///
    /// # Errors
    ///
    /// Returns a [`ReducerError`] if the reducer cannot be built.
    fn create(&self, history: &Arc<dyn History>) -> Result<BoxReducer<S, A>, ReducerError>;
}

impl<S, A, F> ReducerFactory<S, A> for F
where
    F: Fn(&Arc<dyn History>) -> Result<BoxReducer<S, A>, ReducerError> + Send + Sync,
{
    fn create(&self, history: &Arc<dyn History>) -> Result<BoxReducer<S, A>, ReducerError> {
        self(history)
    }
}
