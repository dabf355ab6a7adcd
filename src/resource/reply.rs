use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub type DeferredFn = Box<dyn FnOnce() -> Result<Reply> + Send + 'static>;

/// Work returned by an operation for background execution.
///
/// Clones share the same job; only the first [`take`](DeferredJob::take) gets it.
#[derive(Clone)]
pub struct DeferredJob {
    job: Arc<Mutex<Option<DeferredFn>>>,
}

impl DeferredJob {
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<Reply> + Send + 'static,
    {
        Self {
            job: Arc::new(Mutex::new(Some(Box::new(job)))),
        }
    }

    pub fn take(&self) -> Option<DeferredFn> {
        self.job.lock().take()
    }

    /// Run the job now; a second call fails.
    pub fn run(self) -> Result<Reply> {
        match self.take() {
            Some(job) => job(),
            None => Err(anyhow::anyhow!("deferred job already ran")),
        }
    }
}

impl fmt::Debug for DeferredJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.job.lock().is_some();
        f.debug_struct("DeferredJob").field("pending", &pending).finish()
    }
}

/// Value returned by an operation.
#[derive(Debug, Clone)]
pub enum Reply {
    /// JSON document, rendered through the content producer
    Json(Value),
    /// Plain text body
    Text(String),
    /// No content
    Empty,
    /// Redirect to another location
    Redirect(String),
    /// "See other" redirect, used for finished background tasks
    SeeOther(String),
    /// Background task accepted; poll `location` for the result
    Accepted {
        /// Task key
        key: String,
        /// Status-poll path
        location: String,
    },
    /// Work to run on the execution service
    Deferred(DeferredJob),
}

impl Reply {
    /// Serialize any value into a JSON reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Reply::Json(serde_json::to_value(value)?))
    }

    pub fn deferred<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<Reply> + Send + 'static,
    {
        Reply::Deferred(DeferredJob::new(job))
    }

    /// JSON view of the reply for return-value validation.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Reply::Json(v) => Some(v),
            _ => None,
        }
    }
}
