//! Task records and their state machine.
//!
//! ```text
//! QUEUED ─▶ RUNNING ─▶ DONE | FAILED
//!   │          └──────▶ INTERRUPTED
//!   └─────────────────▶ CANCELLED
//! ```

use super::interrupt::{BoundSignal, InterruptSignal};
use crate::dispatcher::panic_message;
use crate::ids::TaskKey;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unit of work run by the execution service.
pub type Job<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// Task lifecycle. Only moves forward; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
    Interrupted,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Failed | TaskState::Cancelled | TaskState::Interrupted
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Queued => "QUEUED",
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
            TaskState::Failed => "FAILED",
            TaskState::Cancelled => "CANCELLED",
            TaskState::Interrupted => "INTERRUPTED",
        };
        f.write_str(name)
    }
}

/// Why a task produced no result.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The job failed; the cause is its error or panic.
    Execution(Arc<anyhow::Error>),
    Cancelled,
    Interrupted,
    /// The wait deadline passed first. The task keeps running.
    Timeout,
    /// The service is shutting down.
    Rejected,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Execution(cause) => write!(f, "task failed: {cause}"),
            TaskError::Cancelled => write!(f, "task was cancelled"),
            TaskError::Interrupted => write!(f, "task was interrupted"),
            TaskError::Timeout => write!(f, "timed out waiting for task"),
            TaskError::Rejected => write!(f, "execution service is shutting down"),
        }
    }
}

impl std::error::Error for TaskError {}

struct TaskInner<T> {
    state: TaskState,
    job: Option<Job<T>>,
    result: Option<T>,
    cause: Option<Arc<anyhow::Error>>,
    completed_at: Option<Instant>,
}

/// A submitted job and its observable state.
///
/// Mutated only by the worker running it and by cancellation.
pub(crate) struct Task<T> {
    key: TaskKey,
    inner: Mutex<TaskInner<T>>,
    done: Condvar,
    interrupt: Arc<InterruptSignal>,
}

impl<T> Task<T> {
    pub(crate) fn key(&self) -> &TaskKey {
        &self.key
    }

    pub(crate) fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub(crate) fn completed_at(&self) -> Option<Instant> {
        self.inner.lock().completed_at
    }

    pub(crate) fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        self.completed_at()
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

impl<T: Clone> Task<T> {
    pub(crate) fn new(key: TaskKey, job: Job<T>) -> Self {
        Self {
            key,
            inner: Mutex::new(TaskInner {
                state: TaskState::Queued,
                job: Some(job),
                result: None,
                cause: None,
                completed_at: None,
            }),
            done: Condvar::new(),
            interrupt: Arc::new(InterruptSignal::default()),
        }
    }

    fn finish(&self, inner: &mut TaskInner<T>, state: TaskState) {
        inner.state = state;
        inner.job = None;
        inner.completed_at = Some(Instant::now());
        self.done.notify_all();
    }

    /// Run the job on the calling thread.
    ///
    /// Only the first call on a queued task does anything. Returns the
    /// terminal state this call produced, `None` when it produced none.
    pub(crate) fn run(&self) -> Option<TaskState> {
        let job = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Queued {
                return None;
            }
            inner.state = TaskState::Running;
            inner.job.take()
        };

        let outcome = match job {
            Some(job) => {
                let _bound = BoundSignal::bind(Arc::clone(&self.interrupt));
                catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!(
                        "task panicked: {}",
                        panic_message(panic.as_ref())
                    ))
                })
            }
            None => Err(anyhow::anyhow!("task has no job")),
        };

        let mut inner = self.inner.lock();
        // Interrupted while running; the job's own outcome is discarded
        if inner.state != TaskState::Running {
            return None;
        }
        match outcome {
            Ok(value) => {
                inner.result = Some(value);
                self.finish(&mut inner, TaskState::Done);
            }
            Err(cause) => {
                inner.cause = Some(Arc::new(cause));
                self.finish(&mut inner, TaskState::Failed);
            }
        }
        Some(inner.state)
    }

    /// Fail a task that never started.
    pub(crate) fn fail(&self, cause: anyhow::Error) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TaskState::Queued {
            return false;
        }
        inner.cause = Some(Arc::new(cause));
        self.finish(&mut inner, TaskState::Failed);
        true
    }

    /// Cancel the task.
    ///
    /// A queued task becomes CANCELLED. A running task becomes INTERRUPTED
    /// only when `may_interrupt` is set; its worker is signalled. Terminal
    /// tasks are left alone and `false` is returned.
    pub(crate) fn cancel(&self, may_interrupt: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Queued => {
                self.finish(&mut inner, TaskState::Cancelled);
                true
            }
            TaskState::Running if may_interrupt => {
                self.finish(&mut inner, TaskState::Interrupted);
                self.interrupt.raise();
                true
            }
            _ => false,
        }
    }

    /// Block until terminal or until `deadline`.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Result<T, TaskError> {
        let mut inner = self.inner.lock();
        while !inner.state.is_terminal() {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut inner, deadline).timed_out()
                        && !inner.state.is_terminal()
                    {
                        return Err(TaskError::Timeout);
                    }
                }
                None => self.done.wait(&mut inner),
            }
        }
        match inner.state {
            TaskState::Done => inner.result.clone().ok_or_else(|| {
                TaskError::Execution(Arc::new(anyhow::anyhow!("task {} has no result", self.key)))
            }),
            TaskState::Cancelled => Err(TaskError::Cancelled),
            TaskState::Interrupted => Err(TaskError::Interrupted),
            _ => Err(TaskError::Execution(inner.cause.as_ref().map_or_else(
                || Arc::new(anyhow::anyhow!("task {} failed", self.key)),
                Arc::clone,
            ))),
        }
    }
}
