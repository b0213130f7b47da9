//! Effect coordinator.
//!
//! Sagas are long-running async programs reacting to dispatched actions.
//! The [`SagaMiddleware`] sits last in the middleware chain: it lets each
//! action reach the reducer first, then offers it to the sagas waiting in
//! [`SagaContext::take`]. Dispatching [`Signal::End`] closes the coordinator,
//! after which every waiting and future `take` terminates.
//!
//! # Example
//!
//! ```ignore
//! let root = Saga::new("root", |ctx: SagaContext<AppState, AppAction>| async move {
//!     ctx.take_every(|a| matches!(a, AppAction::Load(_)), |ctx, action| async move {
//!         let data = fetch(&action).await?;
//!         ctx.put(AppAction::Loaded(data))?;
//!         Ok(())
//!     });
//!     Ok(())
//! });
//! ```

mod channel;
mod context;
mod task;

pub use context::SagaContext;
pub use task::{Task, TaskStatus};

use crate::error::{SagaError, StoreError};
use crate::middleware::{Middleware, MiddlewareApi, Next};
use channel::ActionChannel;
use isostate_core::Signal;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;

/// Boxed saga body
pub type SagaFuture = Pin<Box<dyn Future<Output = Result<(), SagaError>> + Send>>;

type SagaBody<S, A> = Arc<dyn Fn(SagaContext<S, A>) -> SagaFuture + Send + Sync>;

/// A reusable saga program.
///
/// Running the same saga twice starts two independent tasks.
pub struct Saga<S, A> {
    name: Arc<str>,
    body: SagaBody<S, A>,
}

impl<S, A> Clone for Saga<S, A> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            body: Arc::clone(&self.body),
        }
    }
}

impl<S, A> std::fmt::Debug for Saga<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<S, A> Saga<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Wrap an async program
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(SagaContext<S, A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            body: Arc::new(move |ctx: SagaContext<S, A>| -> SagaFuture { Box::pin(body(ctx)) }),
        }
    }

    /// A saga that returns immediately
    #[must_use]
    pub fn noop() -> Self {
        Self::new("noop", |_ctx| async { Ok(()) })
    }

    /// Name used for the root task
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Middleware running sagas against the store it is mounted on.
///
/// Each store needs its own instance.
pub struct SagaMiddleware<S, A> {
    api: OnceLock<MiddlewareApi<S, A>>,
    channel: Arc<ActionChannel<A>>,
}

impl<S, A> SagaMiddleware<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    /// Create an unmounted coordinator
    #[must_use]
    pub fn new() -> Self {
        Self {
            api: OnceLock::new(),
            channel: Arc::new(ActionChannel::new()),
        }
    }

    /// Start `saga` as a new root task.
    ///
    /// The saga runs on the calling thread up to its first suspension, so
    /// any action dispatched after this returns reaches the takes it opened.
    /// May be called any number of times; tasks run concurrently and share
    /// the store's actions.
    ///
    /// # Errors
    ///
    /// - [`SagaError::NotMounted`] before the middleware is part of a store
    /// - [`SagaError::NoRuntime`] outside of a tokio runtime
    pub fn run(&self, saga: &Saga<S, A>) -> Result<Task, SagaError> {
        let api = self.api.get().ok_or(SagaError::NotMounted)?.clone();
        let runtime = Handle::try_current().map_err(|_| SagaError::NoRuntime)?;

        let task = Task::new(saga.name(), None);
        let ctx = SagaContext::new(api, Arc::clone(&self.channel), runtime.clone(), task.clone());

        metrics::counter!("saga.tasks.started").increment(1);
        tracing::info!(task = task.id(), saga = saga.name(), "Starting saga");

        task::spawn_task(&runtime, &task, (saga.body)(ctx));
        Ok(task)
    }

    /// Check if the termination signal was received
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl<S, A> Default for SagaMiddleware<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> Middleware<S, A> for SagaMiddleware<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn attach(&self, api: &MiddlewareApi<S, A>) {
        if self.api.set(api.clone()).is_err() {
            tracing::warn!("Saga middleware is already mounted; ignoring second store");
        }
    }

    fn handle(
        &self,
        _api: &MiddlewareApi<S, A>,
        signal: Signal<A>,
        next: Next<'_, S, A>,
    ) -> Result<(), StoreError> {
        match signal {
            Signal::Action(action) => {
                next.run(Signal::Action(action.clone()))?;
                self.channel.put(&action);
            },
            Signal::End => {
                next.run(Signal::End)?;
                if self.channel.close() {
                    tracing::info!("Saga channel closed");
                } else {
                    tracing::debug!("Saga channel already closed");
                }
            },
        }
        Ok(())
    }
}
