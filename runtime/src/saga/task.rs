//! Running saga tasks.

use crate::error::SagaError;
use futures::FutureExt;
use futures::task::noop_waker_ref;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::Context;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a task
#[derive(Debug, Clone)]
pub enum TaskStatus {
    /// Body or attached forks still running
    Running,
    /// Completed normally, including by reaching the termination signal
    Done,
    /// Cancelled by its owner or by a failing sibling
    Cancelled,
    /// Failed; the error is also reported to the parent
    Failed(SagaError),
}

impl TaskStatus {
    /// Check if the task reached a final state
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }

    fn into_result(self) -> Result<(), SagaError> {
        match self {
            Self::Running | Self::Done => Ok(()),
            Self::Cancelled => Err(SagaError::Cancelled),
            Self::Failed(error) => Err(error),
        }
    }
}

struct TaskInner {
    id: u64,
    name: String,
    status: watch::Sender<TaskStatus>,
    abort: Mutex<Option<AbortHandle>>,
    children: Mutex<Vec<Task>>,
    parent: Weak<TaskInner>,
}

/// Handle to a running saga.
///
/// A task completes once its body and every task it forked have completed.
///
/// # Example
///
/// ```ignore
/// let task = store.run_saga(&root_saga)?;
/// store.close();
/// task.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub(crate) fn new(name: impl Into<String>, parent: Option<&Self>) -> Self {
        let (status, _) = watch::channel(TaskStatus::Running);
        let task = Self {
            inner: Arc::new(TaskInner {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                status,
                abort: Mutex::new(None),
                children: Mutex::new(Vec::new()),
                parent: parent.map_or_else(Weak::new, |parent| Arc::downgrade(&parent.inner)),
            }),
        };

        if let Some(parent) = parent {
            parent.attach_child(task.clone());
        }
        task
    }

    /// Unique task id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Name given when the task was started
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.inner.status.borrow().clone()
    }

    /// Check if the task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.status.borrow().is_finished()
    }

    /// Cancel the task and every task it forked.
    ///
    /// No effect on a task that already finished.
    pub fn cancel(&self) {
        if self.transition(TaskStatus::Cancelled) {
            tracing::debug!(task = self.id(), name = self.name(), "Task cancelled");
            self.halt();
        }
    }

    /// Wait until the task finishes.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Cancelled`] for a cancelled task, or the
    /// failure that ended it.
    pub async fn done(&self) -> Result<(), SagaError> {
        let mut status = self.inner.status.subscribe();
        let finished = status
            .wait_for(TaskStatus::is_finished)
            .await
            .map(|status| status.clone());

        match finished {
            Ok(status) => status.into_result(),
            Err(_) => self.status().into_result(),
        }
    }

    /// Wait until the task finishes, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Timeout`] if the task is still running when the
    /// timeout elapses, otherwise the same as [`Task::done`].
    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<(), SagaError> {
        tokio::time::timeout(timeout, self.done())
            .await
            .map_err(|_| SagaError::Timeout)?
    }

    fn transition(&self, next: TaskStatus) -> bool {
        self.inner.status.send_if_modified(|status| {
            if status.is_finished() {
                false
            } else {
                *status = next;
                true
            }
        })
    }

    /// Stop the body and every attached fork
    fn halt(&self) {
        if let Some(handle) = self.inner.abort.lock().take() {
            handle.abort();
        }

        let children: Vec<Self> = self.inner.children.lock().drain(..).collect();
        for child in children {
            child.cancel();
        }
    }

    fn set_abort(&self, handle: AbortHandle) {
        *self.inner.abort.lock() = Some(handle);
        // cancelled before the body was spawned
        if !self.is_running() {
            if let Some(handle) = self.inner.abort.lock().take() {
                handle.abort();
            }
        }
    }

    fn attach_child(&self, child: Self) {
        let mut children = self.inner.children.lock();
        children.retain(Self::is_running);
        children.push(child);
    }

    fn parent(&self) -> Option<Self> {
        self.inner.parent.upgrade().map(|inner| Self { inner })
    }

    fn fail(&self, error: SagaError) {
        if self.transition(TaskStatus::Failed(error.clone())) {
            metrics::counter!("saga.tasks.failed").increment(1);
            tracing::warn!(task = self.id(), name = self.name(), %error, "Task failed");
            self.halt();
            if let Some(parent) = self.parent() {
                parent.fail(error);
            }
        }
    }

    fn finish(&self, result: Result<(), SagaError>) {
        match result {
            Ok(()) => {
                if self.transition(TaskStatus::Done) {
                    tracing::debug!(task = self.id(), name = self.name(), "Task done");
                }
            },
            Err(SagaError::Cancelled) => self.cancel(),
            Err(error) => self.fail(error),
        }
    }

    /// Wait for every attached fork; cancelled forks are ignored.
    async fn join_children(&self) -> Result<(), SagaError> {
        loop {
            let pending: Vec<Self> = self
                .inner
                .children
                .lock()
                .iter()
                .filter(|child| child.is_running())
                .cloned()
                .collect();

            if pending.is_empty() {
                return Ok(());
            }

            for child in pending {
                match child.done().await {
                    Ok(()) | Err(SagaError::Cancelled) => {},
                    Err(error) => return Err(error),
                }
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Drive `body` as `task` on `runtime`.
///
/// The body is polled once on the calling thread before it is spawned, so
/// every `take` it registers before its first suspension is in place when
/// this returns. Reaching the termination signal counts as success and
/// panics are reported as [`SagaError::Panicked`].
pub(crate) fn spawn_task<F>(runtime: &Handle, task: &Task, body: F)
where
    F: Future<Output = Result<(), SagaError>> + Send + 'static,
{
    let tracked = task.clone();
    let mut driver: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
        let outcome = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(()) | Err(SagaError::Terminated)) => Ok(()),
            Ok(Err(error)) => Err(error),
            Err(payload) => Err(SagaError::Panicked(panic_message(payload.as_ref()))),
        };

        let outcome = match outcome {
            Ok(()) => tracked.join_children().await,
            Err(error) => Err(error),
        };
        tracked.finish(outcome);
    });

    // wakers registered here are replaced on the spawned task's first poll
    let _runtime = runtime.enter();
    let mut cx = Context::from_waker(noop_waker_ref());
    if driver.as_mut().poll(&mut cx).is_ready() || !task.is_running() {
        return;
    }

    let join = runtime.spawn(driver);
    task.set_abort(join.abort_handle());
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap

    use super::*;

    fn spawn<F>(task: &Task, body: F)
    where
        F: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        spawn_task(&Handle::current(), task, body);
    }

    #[tokio::test]
    async fn test_task_completes() {
        let task = Task::new("ok", None);
        spawn(&task, async { Ok(()) });

        assert!(task.done().await.is_ok());
        assert!(matches!(task.status(), TaskStatus::Done));
    }

    #[tokio::test]
    async fn test_terminated_counts_as_done() {
        let task = Task::new("terminated", None);
        spawn(&task, async { Err(SagaError::Terminated) });

        assert!(task.done().await.is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let task = Task::new("boom", None);
        spawn(&task, async { panic!("exploded") });

        match task.done().await {
            Err(SagaError::Panicked(message)) => assert_eq!(message, "exploded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parent_waits_for_children() {
        let parent = Task::new("parent", None);
        let child = Task::new("child", Some(&parent));
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        spawn(&child, async move {
            let _ = gate.await;
            Ok(())
        });
        spawn(&parent, async { Ok(()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(parent.is_running());

        release.send(()).unwrap();
        parent.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert!(!child.is_running());
    }

    #[tokio::test]
    async fn test_failing_child_fails_parent_and_cancels_siblings() {
        let parent = Task::new("parent", None);
        let sibling = Task::new("sibling", Some(&parent));
        let failing = Task::new("failing", Some(&parent));

        spawn(&sibling, std::future::pending());
        spawn(&parent, std::future::pending());
        spawn(&failing, async { Err(SagaError::Failed("bad input".to_string())) });

        let result = parent.wait_with_timeout(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SagaError::Failed(_))));
        assert!(matches!(sibling.status(), TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_is_recursive_and_final() {
        let parent = Task::new("parent", None);
        let child = Task::new("child", Some(&parent));
        spawn(&child, std::future::pending());
        spawn(&parent, std::future::pending());

        parent.cancel();
        parent.cancel();

        assert!(matches!(parent.done().await, Err(SagaError::Cancelled)));
        assert!(matches!(child.status(), TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_with_timeout_expires() {
        let task = Task::new("slow", None);
        spawn(&task, std::future::pending());

        let result = task.wait_with_timeout(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SagaError::Timeout)));
        assert!(task.is_running());
        task.cancel();
    }

    #[tokio::test]
    async fn test_body_runs_to_first_suspension_before_return() {
        let task = Task::new("eager", None);
        let reached = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        spawn(&task, async move {
            flag.store(true, Ordering::SeqCst);
            let _ = gate.await;
            Ok(())
        });

        assert!(reached.load(Ordering::SeqCst));
        assert!(task.is_running());

        release.send(()).unwrap();
        task.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_body_without_suspension_finishes_immediately() {
        let task = Task::new("instant", None);
        spawn(&task, async { Ok(()) });

        assert!(matches!(task.status(), TaskStatus::Done));
    }
}
