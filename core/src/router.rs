//! History-aware state slice.
//!
//! Reducer factories receive the store's [`History`]; seeding a
//! [`RouterState`] from it keeps the first render and the history in step.

use crate::history::{History, Location, LocationChange, NavigationKind};
use serde::{Deserialize, Serialize};

/// The router slice of an application state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterState {
    /// Current location
    pub location: Location,
    /// How the current location was reached
    pub kind: NavigationKind,
}

impl RouterState {
    /// Seed the slice from the history's current entry
    #[must_use]
    pub fn from_history(history: &dyn History) -> Self {
        Self {
            location: history.location(),
            kind: history.action(),
        }
    }

    /// Record a location change
    pub fn apply(&mut self, change: LocationChange) {
        self.location = change.location;
        self.kind = change.kind;
    }
}

impl Default for RouterState {
    fn default() -> Self {
        Self {
            location: Location::parse("/"),
            kind: NavigationKind::Pop,
        }
    }
}
