//! # Isostate Runtime
//!
//! Runtime implementation for Isostate.
//!
//! This crate assembles the store an application uses on both sides of a
//! server-rendered page.
//!
//! ## Core Components
//!
//! - **Store**: state, reducer, subscribers, and the dispatch gate
//! - **Middleware**: ordered interceptors; history sync runs before sagas
//! - **Enhancer**: optional devtools instrumentation around the middleware
//! - **Sagas**: cooperative effect programs reacting to dispatched actions
//! - **Store factory**: picks the history, wires everything, and exposes the
//!   `run_saga`/`close` lifecycle a server request handler needs
//!
//! ## Example
//!
//! ```ignore
//! use isostate_runtime::{HostEnvironment, StoreFactory};
//!
//! let factory = StoreFactory::new(create_root_reducer, root_saga(), HostEnvironment::server(profile));
//!
//! // One store per request
//! let configured = factory.configure_store(AppState::default(), "/orders")?;
//! let root = configured.store.run_saga(factory.root_saga())?;
//! render(&configured);
//! configured.store.settle(&root, Duration::from_secs(5)).await?;
//! ```

use isostate_core::{HistoryError, ReducerError};

/// The central state container
pub mod store;

/// Interceptor chain and history sync
pub mod middleware;

/// Store enhancers and the devtools composer
pub mod enhancer;

/// Cooperative effect programs
pub mod saga;

/// Environment-aware store assembly
pub mod configure;

/// Error types for the Store runtime
pub mod error {
    use super::{HistoryError, ReducerError};
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone)]
    pub enum StoreError {
        /// The reducer could not be built or initialized
        ///
        /// Fatal during construction. During a reducer replacement the
        /// previous reducer stays active.
        #[error("Reducer failed: {0}")]
        Reducer(#[from] ReducerError),

        /// The navigation history could not be built or moved
        #[error("History failed: {0}")]
        History(#[from] HistoryError),

        /// The effect coordinator could not start a program
        #[error("Effect coordinator failed: {0}")]
        Saga(#[from] SagaError),

        /// A dispatch was attempted while a reducer was running
        #[error("Reducers may not dispatch actions")]
        DispatchInReducer,

        /// The store behind a middleware or saga handle was dropped
        #[error("Store has been dropped")]
        Dropped,
    }

    /// Errors raised by the effect coordinator and its tasks
    #[derive(Error, Debug, Clone)]
    pub enum SagaError {
        /// `run` was called before the middleware was mounted on a store
        #[error("Saga middleware is not mounted on a store")]
        NotMounted,

        /// `run` was called outside of a tokio runtime
        #[error("No async runtime available to run sagas")]
        NoRuntime,

        /// The termination signal reached a waiting `take`
        ///
        /// Tasks ending this way complete normally.
        #[error("Saga channel terminated")]
        Terminated,

        /// The task was cancelled
        #[error("Task was cancelled")]
        Cancelled,

        /// The program reported a failure
        #[error("Saga failed: {0}")]
        Failed(String),

        /// The program panicked
        #[error("Saga panicked: {0}")]
        Panicked(String),

        /// Waiting for a task exceeded its deadline
        #[error("Timeout waiting for task")]
        Timeout,

        /// A `put` or `select` against the store failed
        #[error("Store operation from saga failed: {0}")]
        Store(Box<StoreError>),
    }

    impl From<StoreError> for SagaError {
        fn from(error: StoreError) -> Self {
            Self::Store(Box::new(error))
        }
    }
}

pub use configure::{
    AppStore, ConfiguredStore, HostEnvironment, HotReloadRuntime, ReloadHook, StoreFactory,
};
pub use enhancer::{Composer, DevtoolsHook, Enhancer, apply_middleware, get_composer};
pub use error::{SagaError, StoreError};
pub use middleware::{Middleware, MiddlewareApi, Next, RouterMiddleware, build_middleware};
pub use saga::{Saga, SagaContext, SagaMiddleware, Task, TaskStatus};
pub use store::{Store, StoreBuilder, SubscriptionId};
