//! # Isostate Core
//!
//! Core traits and types for Isostate, a state container that is assembled
//! the same way inside a browser and inside a server-side rendering process.
//!
//! This crate holds everything that does not need an async runtime:
//!
//! - **Environment**: the resolved [`EnvironmentMode`] and [`BuildProfile`]
//! - **Configuration**: [`StoreConfig`], loaded from the process environment
//! - **Actions**: the [`Signal`] envelope and the [`RoutedAction`] contract
//! - **History**: in-memory and browser-backed navigation stacks
//! - **Reducers**: the [`Reducer`] trait, its factory, and composition helpers
//!
//! ## Architecture Principles
//!
//! - The environment is resolved once and passed down as a value
//! - Reducers are plain state transitions; asynchronous work lives in sagas
//! - Every host facility (browser navigation, devtools, hot reload) is a trait
//!
//! ## Example
//!
//! ```
//! use isostate_core::history::{create_history, History};
//! use isostate_core::EnvironmentMode;
//!
//! let history = create_history(EnvironmentMode::Server, "/orders?page=2", None)?;
//! assert_eq!(history.location().pathname, "/orders");
//! assert_eq!(history.length(), 1);
//! # Ok::<(), isostate_core::history::HistoryError>(())
//! ```

pub mod action;
pub mod composition;
pub mod config;
pub mod environment;
pub mod history;
pub mod reducer;
pub mod router;

pub use action::{Navigation, RoutedAction, Signal};
pub use config::StoreConfig;
pub use environment::{BuildProfile, EnvironmentMode, HostSignals};
pub use history::{
    BrowserHistory, History, HistoryError, HistoryListener, ListenerId, Location, LocationChange,
    MemoryHistory, NavigationBackend, NavigationKind, PopCallback, create_history,
};
pub use reducer::{BoxReducer, Reducer, ReducerError, ReducerFactory};
pub use router::RouterState;
