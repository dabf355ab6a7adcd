//! Elastic worker pool with a keyed task map.
//!
//! Workers start on demand up to the configured limit and retire after the
//! keep-alive passes without work. Finished tasks stay resolvable by key for
//! the retention window and are purged lazily on submit and lookup.

use super::config::ExecutorConfig;
use super::task::{Job, Task, TaskError, TaskState};
use crate::ids::{KeyGenerator, TaskKey};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters for an execution service.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub interrupted: AtomicU64,
    pub purged: AtomicU64,
    pub workers_started: AtomicU64,
    pub workers_retired: AtomicU64,
}

/// Point-in-time copy of [`ExecutorMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub interrupted: u64,
    pub purged: u64,
    pub workers_started: u64,
    pub workers_retired: u64,
}

impl ExecutorMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_terminal(&self, state: TaskState) {
        match state {
            TaskState::Done => Self::bump(&self.completed),
            TaskState::Failed => Self::bump(&self.failed),
            TaskState::Cancelled => Self::bump(&self.cancelled),
            TaskState::Interrupted => Self::bump(&self.interrupted),
            TaskState::Queued | TaskState::Running => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_retired: self.workers_retired.load(Ordering::Relaxed),
        }
    }
}

struct PoolState<T> {
    queue: VecDeque<Arc<Task<T>>>,
    workers: usize,
    idle: usize,
}

struct Shared<T> {
    config: ExecutorConfig,
    tasks: DashMap<TaskKey, Arc<Task<T>>>,
    pool: Mutex<PoolState<T>>,
    work_available: Condvar,
    terminated: Condvar,
    shutting_down: AtomicBool,
    keys: KeyGenerator,
    metrics: ExecutorMetrics,
    worker_seq: AtomicU64,
}

/// Worker pool running keyed background tasks.
///
/// A submission goes to an idle worker when one is waiting, otherwise to a
/// new worker while below `max_workers`, otherwise to a FIFO queue. Workers
/// that find no work for `keep_alive` retire. Finished tasks stay queryable
/// for the retention window.
pub struct ExecutionService<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ExecutionService<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> ExecutionService<T> {
    pub fn new(config: ExecutorConfig) -> Self {
        info!(
            pool = %config.pool_name,
            max_workers = config.max_workers,
            keep_alive_ms = config.keep_alive_ms,
            retention_ms = config.retention_ms,
            "Execution service created"
        );
        Self {
            shared: Arc::new(Shared {
                config,
                tasks: DashMap::new(),
                pool: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                }),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
                shutting_down: AtomicBool::new(false),
                keys: KeyGenerator::new(),
                metrics: ExecutorMetrics::default(),
                worker_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::new(ExecutorConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Submit a job under a random key.
    pub fn submit<F>(&self, job: F) -> Result<TaskKey, TaskError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let key = self.shared.keys.random();
        self.enqueue(key, Box::new(job))
    }

    /// Submit a job under `<prefix>-<n>`.
    pub fn submit_with_prefix<F>(&self, prefix: &str, job: F) -> Result<TaskKey, TaskError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let key = self.shared.keys.prefixed(prefix);
        self.enqueue(key, Box::new(job))
    }

    fn reject(&self, key: &TaskKey) -> TaskError {
        ExecutorMetrics::bump(&self.shared.metrics.rejected);
        warn!(key = %key, "Submission rejected, execution service is shutting down");
        TaskError::Rejected
    }

    fn enqueue(&self, key: TaskKey, job: Job<T>) -> Result<TaskKey, TaskError> {
        let shared = &self.shared;
        if shared.shutting_down.load(Ordering::SeqCst) {
            return Err(self.reject(&key));
        }
        self.purge_expired();

        let task = Arc::new(Task::new(key.clone(), job));
        let spawn = {
            let mut pool = shared.pool.lock();
            // Shutdown flips under this lock; re-check so nothing lands after the drain
            if shared.shutting_down.load(Ordering::SeqCst) {
                drop(pool);
                return Err(self.reject(&key));
            }
            shared.tasks.insert(key.clone(), Arc::clone(&task));
            pool.queue.push_back(Arc::clone(&task));
            ExecutorMetrics::bump(&shared.metrics.submitted);

            if pool.idle >= pool.queue.len() {
                shared.work_available.notify_one();
                false
            } else if shared
                .config
                .max_workers()
                .map_or(true, |max| pool.workers < max)
            {
                pool.workers += 1;
                true
            } else {
                false
            }
        };

        debug!(key = %key, spawn_worker = spawn, "Task submitted");
        if spawn {
            self.spawn_worker(&task);
        }
        Ok(key)
    }

    fn spawn_worker(&self, first: &Arc<Task<T>>) {
        let n = self.shared.worker_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-worker-{n}", self.shared.config.pool_name);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&shared));

        match spawned {
            Ok(_) => {
                ExecutorMetrics::bump(&self.shared.metrics.workers_started);
                debug!(worker = %name, "Worker started");
            }
            Err(err) => {
                error!(worker = %name, error = %err, "Failed to start worker");
                let mut pool = self.shared.pool.lock();
                pool.workers -= 1;
                // Without any worker the queued task would never run
                if pool.workers == 0 {
                    pool.queue.retain(|t| !Arc::ptr_eq(t, first));
                    drop(pool);
                    if first.fail(anyhow::anyhow!("cannot start worker thread: {err}")) {
                        self.shared.metrics.record_terminal(TaskState::Failed);
                    }
                }
            }
        }
    }

    /// Handle for `key`, or `None` when unknown or purged.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<TaskHandle<T>> {
        self.purge_expired();
        self.shared.tasks.get(key).map(|task| TaskHandle {
            task: Arc::clone(task.value()),
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Drop finished tasks older than the retention window; returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let retention = self.shared.config.retention();
        let mut purged = 0;
        self.shared.tasks.retain(|_, task| {
            let expired = task.is_expired(now, retention);
            purged += usize::from(expired);
            !expired
        });
        if purged > 0 {
            self.shared
                .metrics
                .purged
                .fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, "Purged expired tasks");
        }
        purged
    }

    /// Stop accepting work.
    ///
    /// Tasks that have not started are cancelled. Running tasks are interrupted when
    /// `may_interrupt` is set, otherwise they run to completion.
    pub fn shutdown(&self, may_interrupt: bool) {
        let drained: Vec<Arc<Task<T>>> = {
            let mut pool = self.shared.pool.lock();
            self.shared.shutting_down.store(true, Ordering::SeqCst);
            self.shared.work_available.notify_all();
            pool.queue.drain(..).collect()
        };

        let mut cancelled = 0usize;
        for task in &drained {
            if task.cancel(false) {
                self.shared.metrics.record_terminal(TaskState::Cancelled);
                cancelled += 1;
            }
        }
        // Popped by a worker but not started yet
        for entry in self.shared.tasks.iter() {
            let task = entry.value();
            if task.state() == TaskState::Queued && task.cancel(false) {
                self.shared.metrics.record_terminal(TaskState::Cancelled);
                cancelled += 1;
            }
        }

        let mut interrupted = 0usize;
        if may_interrupt {
            for entry in self.shared.tasks.iter() {
                let task = entry.value();
                if task.state() == TaskState::Running && task.cancel(true) {
                    self.shared.metrics.record_terminal(TaskState::Interrupted);
                    interrupted += 1;
                }
            }
        }

        info!(
            pool = %self.shared.config.pool_name,
            cancelled,
            interrupted,
            "Execution service shutting down"
        );
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait for all workers to retire after [`shutdown`](Self::shutdown).
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pool = self.shared.pool.lock();
        while pool.workers > 0 {
            if self
                .shared
                .terminated
                .wait_until(&mut pool, deadline)
                .timed_out()
            {
                return pool.workers == 0;
            }
        }
        true
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Live worker threads, busy or idle.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.shared.pool.lock().workers
    }

    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.shared.pool.lock().idle
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.pool.lock().queue.len()
    }

    /// Tasks still resolvable by key.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.shared.tasks.len()
    }
}

fn worker_loop<T: Clone + Send + 'static>(shared: &Shared<T>) {
    let keep_alive = shared.config.keep_alive();
    loop {
        let next = {
            let mut pool = shared.pool.lock();
            let deadline = Instant::now() + keep_alive;
            let found = loop {
                if let Some(task) = pool.queue.pop_front() {
                    break Some(task);
                }
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break None;
                }
                pool.idle += 1;
                let timed_out = shared
                    .work_available
                    .wait_until(&mut pool, deadline)
                    .timed_out();
                pool.idle -= 1;
                if timed_out && pool.queue.is_empty() {
                    break None;
                }
            };
            if found.is_none() {
                // Retire under the same lock so no submission counts this worker
                pool.workers -= 1;
                if pool.workers == 0 {
                    shared.terminated.notify_all();
                }
            }
            found
        };

        let Some(task) = next else {
            ExecutorMetrics::bump(&shared.metrics.workers_retired);
            debug!("Worker retired");
            return;
        };

        if let Some(state) = task.run() {
            shared.metrics.record_terminal(state);
            match state {
                TaskState::Failed => warn!(key = %task.key(), state = %state, "Task finished"),
                _ => debug!(key = %task.key(), state = %state, "Task finished"),
            }
        }
    }
}

/// Future-like view of one task.
pub struct TaskHandle<T> {
    task: Arc<Task<T>>,
    shared: Weak<Shared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("key", &self.task.key())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    #[must_use]
    pub fn key(&self) -> &TaskKey {
        self.task.key()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancel the task; see [`TaskState`] for which transitions succeed.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let was = self.task.state();
        if !self.task.cancel(may_interrupt) {
            return false;
        }
        if let Some(shared) = self.shared.upgrade() {
            if was == TaskState::Queued {
                shared
                    .pool
                    .lock()
                    .queue
                    .retain(|t| !Arc::ptr_eq(t, &self.task));
            }
            shared.metrics.record_terminal(self.task.state());
        }
        info!(key = %self.task.key(), state = %self.task.state(), "Task cancelled");
        true
    }

    /// Wait up to `timeout` for the outcome. A timeout does not stop the task.
    pub fn get(&self, timeout: Duration) -> Result<T, TaskError> {
        self.task.wait(Some(Instant::now() + timeout))
    }

    /// Wait for the outcome without a deadline.
    pub fn wait(&self) -> Result<T, TaskError> {
        self.task.wait(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug_shows_key() {
        let service = ExecutionService::new(ExecutorConfig::default());
        let key = service.submit_with_prefix("debug", || Ok(1u32)).unwrap();
        let handle = service.get(key.as_str()).unwrap();
        assert_eq!(format!("{handle:?}"), "TaskHandle { key: TaskKey(\"debug-1\"), .. }");
    }

    #[test]
    fn test_shutdown_cancels_task_taken_off_the_queue() {
        let service = ExecutionService::<u32>::new(ExecutorConfig::default());
        // A worker has popped the task but not run it yet
        let job: Job<u32> = Box::new(|| Ok(1));
        let task = Arc::new(Task::new(TaskKey::from_string("popped"), job));
        service
            .shared
            .tasks
            .insert(TaskKey::from_string("popped"), Arc::clone(&task));

        service.shutdown(true);

        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(task.run(), None);
        assert_eq!(service.metrics().cancelled, 1);
    }
}
