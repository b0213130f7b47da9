//! Effects available to a running saga.

use super::channel::ActionChannel;
use super::task::{Task, spawn_task};
use crate::error::SagaError;
use crate::middleware::MiddlewareApi;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// What a saga body receives.
///
/// Cloning a context keeps its scope: forks started from either clone are
/// attached to the same task.
pub struct SagaContext<S, A> {
    api: MiddlewareApi<S, A>,
    channel: Arc<ActionChannel<A>>,
    runtime: Handle,
    scope: Task,
}

impl<S, A> Clone for SagaContext<S, A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            channel: Arc::clone(&self.channel),
            runtime: self.runtime.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S, A> std::fmt::Debug for SagaContext<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext")
            .field("task", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<S, A> SagaContext<S, A>
where
    S: Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(
        api: MiddlewareApi<S, A>,
        channel: Arc<ActionChannel<A>>,
        runtime: Handle,
        scope: Task,
    ) -> Self {
        Self {
            api,
            channel,
            runtime,
            scope,
        }
    }

    fn scoped(&self, scope: Task) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    /// The task this context belongs to
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.scope
    }

    /// Wait for the next dispatched action matching `pattern`.
    ///
    /// Only actions dispatched after the call are considered.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Terminated`] once the store is closed. Propagating
    /// it with `?` ends the saga normally.
    pub async fn take<P>(&self, pattern: P) -> Result<A, SagaError>
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        self.take_maybe(pattern).await.ok_or(SagaError::Terminated)
    }

    /// Like [`SagaContext::take`], but reports termination as `None`
    pub async fn take_maybe<P>(&self, pattern: P) -> Option<A>
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        let reply = self.channel.take(Box::new(pattern));
        reply.await.ok().flatten()
    }

    /// Dispatch an action through the whole middleware chain.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Store`] if the dispatch fails.
    pub fn put(&self, action: A) -> Result<(), SagaError> {
        self.api.dispatch(action).map_err(SagaError::from)
    }

    /// Read the store state.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Store`] if the store was dropped.
    pub fn select<F, T>(&self, f: F) -> Result<T, SagaError>
    where
        F: FnOnce(&S) -> T,
    {
        self.api.state(f).map_err(SagaError::from)
    }

    /// Sleep for `duration`
    pub async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Start an attached child task.
    ///
    /// The child runs up to its first suspension before this returns.
    /// The current task does not complete before the child does, a failing
    /// child fails the current task, and cancelling the current task cancels
    /// the child.
    pub fn fork<F, Fut>(&self, name: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        let task = Task::new(name, Some(&self.scope));
        let future = body(self.scoped(task.clone()));
        spawn_task(&self.runtime, &task, future);
        task
    }

    /// Fork `worker` for every action matching `pattern`.
    ///
    /// Runs until the store is closed, then waits for in-flight workers.
    pub fn take_every<P, W, Fut>(&self, pattern: P, worker: W) -> Task
    where
        P: Fn(&A) -> bool + Send + 'static,
        W: Fn(Self, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        let mut actions = self.channel.subscribe(Box::new(pattern));
        self.fork("take_every", move |ctx| async move {
            while let Some(action) = actions.recv().await {
                ctx.fork("take_every_worker", |child| worker(child, action));
            }
            Ok(())
        })
    }

    /// Fork `worker` for every action matching `pattern`, cancelling the
    /// previous worker if it is still running.
    pub fn take_latest<P, W, Fut>(&self, pattern: P, worker: W) -> Task
    where
        P: Fn(&A) -> bool + Send + 'static,
        W: Fn(Self, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        let mut actions = self.channel.subscribe(Box::new(pattern));
        self.fork("take_latest", move |ctx| async move {
            let mut latest: Option<Task> = None;
            while let Some(action) = actions.recv().await {
                if let Some(previous) = latest.take() {
                    previous.cancel();
                }
                latest = Some(ctx.fork("take_latest_worker", |child| worker(child, action)));
            }
            Ok(())
        })
    }
}
