//! Actions as they travel through a store.
//!
//! Application actions are wrapped in a [`Signal`] so the termination
//! sentinel can share the dispatch path without being part of every
//! application's action enum.

use crate::history::LocationChange;

/// What a store's dispatch entry point carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<A> {
    /// An application action, delivered to middleware and the reducer
    Action(A),
    /// Termination sentinel: winds down every effect program on the store.
    ///
    /// Reducers and subscribers never see it.
    End,
}

impl<A> Signal<A> {
    /// The wrapped action, if this is not the sentinel
    #[must_use]
    pub const fn action(&self) -> Option<&A> {
        match self {
            Self::Action(action) => Some(action),
            Self::End => None,
        }
    }

    /// Check if this is the termination sentinel
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl<A> From<A> for Signal<A> {
    fn from(action: A) -> Self {
        Self::Action(action)
    }
}

/// Request to move the navigation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Append a new entry
    Push(String),
    /// Overwrite the current entry
    Replace(String),
    /// Move by a relative offset
    Go(isize),
    /// Same as `Go(-1)`
    Back,
    /// Same as `Go(1)`
    Forward,
}

/// Contract between an application's action type and history sync.
///
/// # Example
///
/// ```
/// use isostate_core::{LocationChange, Navigation, RoutedAction};
///
/// #[derive(Debug, Clone)]
/// enum AppAction {
///     Navigate(Navigation),
///     LocationChanged(LocationChange),
///     Refresh,
/// }
///
/// impl RoutedAction for AppAction {
///     fn navigation(&self) -> Option<&Navigation> {
///         match self {
///             Self::Navigate(nav) => Some(nav),
///             _ => None,
///         }
///     }
///
///     fn location_changed(change: LocationChange) -> Self {
///         Self::LocationChanged(change)
///     }
/// }
/// ```
pub trait RoutedAction: Clone + Send + Sync + 'static {
    /// The navigation this action requests, if any.
    ///
    /// Such actions are consumed by history sync and never reach reducers.
    fn navigation(&self) -> Option<&Navigation>;

    /// Build the action announcing that the history moved.
    fn location_changed(change: LocationChange) -> Self;
}
