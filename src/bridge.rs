//! # Async Bridge
//!
//! Connects route dispatch to the [`ExecutionService`].
//!
//! - Requests to `<status prefix><key>` poll a submitted task: `GET` returns
//!   the outcome or the pending handle, `DELETE` cancels a pending task.
//! - Operations marked asynchronous, and operations that return
//!   [`Reply::Deferred`], run on the execution service. The caller gets
//!   [`Reply::Accepted`] pointing at the status path.
//! - Everything else is invoked synchronously.
//!
//! Before submitting, the operation's [`RejectRule`] is checked against the
//! submissions of the same operation that are still in flight.

use crate::dispatcher::Invoker;
use crate::error::HttpFailure;
use crate::executor::{ExecutionService, TaskError, TaskHandle};
use crate::ids::TaskKey;
use crate::request::Request;
use crate::resource::{OperationDef, RejectRule, Reply};
use crate::router::RouteMatch;
use http::Method;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default status-poll prefix.
pub const DEFAULT_STATUS_PREFIX: &str = "/_status/";

/// Result of a dispatch that did not fail.
#[derive(Debug)]
pub enum Dispatched {
    Complete(Reply),
    /// The polled task is still running
    Pending(TaskHandle<Reply>),
}

/// What the reject rules compare.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    operation: String,
    method: Method,
    path: String,
    digest: Vec<u8>,
    identity: Option<String>,
}

impl Fingerprint {
    fn of(request: &Request, operation: String) -> Self {
        Self {
            operation,
            method: request.method.clone(),
            path: request.path.clone(),
            digest: Sha256::digest(&request.body).to_vec(),
            identity: request.identity.as_ref().map(|identity| identity.0.clone()),
        }
    }

    fn same_content(&self, other: &Self) -> bool {
        self.path == other.path && self.digest == other.digest
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.identity.is_some() && self.identity == other.identity
    }

    fn clashes(&self, other: &Self, rule: RejectRule) -> bool {
        if self.operation != other.operation {
            return false;
        }
        match rule {
            RejectRule::None => false,
            RejectRule::SamePath => self.method == other.method && self.path == other.path,
            RejectRule::SameContent => self.same_content(other),
            RejectRule::SameIdentity => self.same_identity(other),
            RejectRule::Both => self.same_identity(other) && self.same_content(other),
        }
    }
}

struct InFlight {
    fingerprint: Fingerprint,
    handle: TaskHandle<Reply>,
}

/// Routes matches either to the invoker or to the execution service.
pub struct AsyncBridge {
    executor: ExecutionService<Reply>,
    invoker: Arc<Invoker>,
    status_prefix: String,
    inflight: Mutex<Vec<InFlight>>,
}

impl AsyncBridge {
    pub fn new(
        executor: ExecutionService<Reply>,
        invoker: Arc<Invoker>,
        status_prefix: impl Into<String>,
    ) -> Self {
        let mut status_prefix = status_prefix.into();
        if !status_prefix.starts_with('/') {
            status_prefix.insert(0, '/');
        }
        if !status_prefix.ends_with('/') {
            status_prefix.push('/');
        }
        Self {
            executor,
            invoker,
            status_prefix,
            inflight: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn executor(&self) -> &ExecutionService<Reply> {
        &self.executor
    }

    #[must_use]
    pub fn status_prefix(&self) -> &str {
        &self.status_prefix
    }

    /// Status-poll path for `key`.
    #[must_use]
    pub fn status_path(&self, key: &TaskKey) -> String {
        format!("{}{key}", self.status_prefix)
    }

    /// Task key addressed by a status-poll path.
    #[must_use]
    pub fn status_key<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.status_prefix.as_str())
            .filter(|key| !key.is_empty() && !key.contains('/'))
    }

    #[must_use]
    pub fn is_status_path(&self, path: &str) -> bool {
        self.status_key(path).is_some()
    }

    /// Submissions still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        let mut inflight = self.inflight.lock();
        inflight.retain(|f| !f.handle.is_done());
        inflight.len()
    }

    /// Dispatch `route` for `request`.
    pub fn invoke(&self, request: &Request, route: RouteMatch) -> Result<Dispatched, HttpFailure> {
        if let Some(key) = self.status_key(&request.path) {
            return self.poll(request, key);
        }

        let mut matched = route.into_result()?;
        if let Some(failure) = matched.failure.take() {
            return Err(failure);
        }
        let operation = Arc::clone(matched.entry.operation());
        let fingerprint = Fingerprint::of(request, matched.entry.id());

        if operation.is_asynchronous() {
            let invoker = Arc::clone(&self.invoker);
            return self.submit(&operation, fingerprint, move || {
                match invoker.invoke(matched).map_err(anyhow::Error::new)? {
                    Reply::Deferred(job) => job.run(),
                    reply => Ok(reply),
                }
            });
        }

        match self.invoker.invoke(matched)? {
            Reply::Deferred(job) => self.submit(&operation, fingerprint, move || job.run()),
            reply => Ok(Dispatched::Complete(reply)),
        }
    }

    fn submit<F>(
        &self,
        operation: &OperationDef,
        fingerprint: Fingerprint,
        job: F,
    ) -> Result<Dispatched, HttpFailure>
    where
        F: FnOnce() -> anyhow::Result<Reply> + Send + 'static,
    {
        let rule = operation.reject_rule();
        let mut inflight = self.inflight.lock();
        inflight.retain(|f| !f.handle.is_done());

        if let Some(existing) = inflight
            .iter()
            .find(|f| f.fingerprint.clashes(&fingerprint, rule))
        {
            let key = existing.handle.key().to_string();
            warn!(
                operation = %fingerprint.operation,
                path = %fingerprint.path,
                rule = ?rule,
                existing = %key,
                "Submission rejected, equivalent request in flight"
            );
            return Err(HttpFailure::Conflict { key });
        }

        let submitted = match operation.task_key_prefix() {
            Some(prefix) => self.executor.submit_with_prefix(prefix, job),
            None => self.executor.submit(job),
        };
        let key = submitted.map_err(|err| task_failure("", err))?;

        // A finished task may already be purged under a zero retention window
        if let Some(handle) = self.executor.get(key.as_str()) {
            inflight.push(InFlight {
                fingerprint: fingerprint.clone(),
                handle,
            });
        }

        let location = self.status_path(&key);
        info!(
            operation = %fingerprint.operation,
            path = %fingerprint.path,
            key = %key,
            location = %location,
            "Request accepted for background execution"
        );
        Ok(Dispatched::Complete(Reply::Accepted {
            key: key.to_string(),
            location,
        }))
    }

    fn poll(&self, request: &Request, key: &str) -> Result<Dispatched, HttpFailure> {
        if request.method != Method::GET && request.method != Method::DELETE {
            return Err(HttpFailure::MethodNotAllowed {
                allowed: vec![Method::GET, Method::DELETE],
            });
        }
        let Some(handle) = self.executor.get(key) else {
            debug!(key = %key, "Status poll for unknown task");
            return Err(HttpFailure::NotFound);
        };

        if !handle.is_done() {
            if request.method == Method::DELETE && handle.cancel(true) {
                info!(key = %key, "Task cancelled by status request");
                return Ok(Dispatched::Complete(Reply::Empty));
            }
            if !handle.is_done() {
                return Ok(Dispatched::Pending(handle));
            }
        }

        match handle.get(Duration::ZERO) {
            Ok(Reply::Redirect(location)) => Ok(Dispatched::Complete(Reply::SeeOther(location))),
            Ok(reply) => Ok(Dispatched::Complete(reply)),
            Err(TaskError::Timeout) => Ok(Dispatched::Pending(handle)),
            Err(err) => Err(task_failure(key, err)),
        }
    }
}

fn task_failure(key: &str, err: TaskError) -> HttpFailure {
    match err {
        TaskError::Execution(cause) => HttpFailure::from_shared_cause(cause),
        TaskError::Cancelled => HttpFailure::Cancelled {
            key: key.to_string(),
        },
        TaskError::Interrupted => HttpFailure::Interrupted {
            key: key.to_string(),
        },
        TaskError::Rejected => HttpFailure::Rejected,
        TaskError::Timeout => HttpFailure::status_with(504, "timed out waiting for task"),
    }
}
