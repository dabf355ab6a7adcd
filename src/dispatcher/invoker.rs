//! Handler invocation.
//!
//! One call runs construct, validate arguments, call, validate reply. Handler
//! errors are classified by root cause and panics never leave the invoker.

use crate::error::HttpFailure;
use crate::resource::Reply;
use crate::router::MatchedRoute;
use crate::validator::{NoopValidator, Validator};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Readable text from a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Calls matched operations.
///
/// Every failure is returned as an [`HttpFailure`] value: handler errors are
/// classified by root cause and panics become internal errors.
pub struct Invoker {
    validator: Arc<dyn Validator>,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(Arc::new(NoopValidator))
    }
}

impl Invoker {
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self { validator }
    }

    /// Construct the handler, validate, call, validate the reply.
    pub fn invoke(&self, matched: MatchedRoute) -> Result<Reply, HttpFailure> {
        let MatchedRoute {
            entry,
            constructor_args,
            operation_args,
            failure,
            ..
        } = matched;
        let handler = entry.id();

        if let Some(failure) = failure {
            return Err(failure);
        }

        let constructed = catch_unwind(AssertUnwindSafe(|| {
            entry.constructor().build(constructor_args)
        }));
        let instance = match constructed {
            Ok(Ok(instance)) => instance,
            Ok(Err(err)) => return Err(Self::classify(&handler, err)),
            Err(panic) => return Err(Self::panicked(&handler, "constructor", panic.as_ref())),
        };

        let operation = entry.operation();
        let violations =
            self.validator
                .validate_parameters(instance.as_ref(), operation, &operation_args);
        if !violations.is_empty() {
            debug!(handler = %handler, violations = violations.len(), "Parameter validation failed");
            return Err(HttpFailure::BadRequest {
                message: format!("invalid arguments for {}", operation.name()),
                violations,
            });
        }

        let called = catch_unwind(AssertUnwindSafe(|| operation.call(&instance, operation_args)));
        let reply = match called {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Err(Self::classify(&handler, err)),
            Err(panic) => return Err(Self::panicked(&handler, "operation", panic.as_ref())),
        };

        let violations = self
            .validator
            .validate_return_value(instance.as_ref(), operation, &reply);
        if !violations.is_empty() {
            warn!(
                handler = %handler,
                violations = ?violations,
                "Reply violates the declared response contract"
            );
            return Err(HttpFailure::BadResponse { violations });
        }

        Ok(reply)
    }

    fn classify(handler: &str, err: anyhow::Error) -> HttpFailure {
        let failure = HttpFailure::from_root_cause(err);
        match &failure {
            HttpFailure::Internal { cause } => {
                error!(handler = %handler, error = ?cause, "Handler failed");
            }
            other => {
                debug!(handler = %handler, status = other.status(), error = %other, "Handler declined");
            }
        }
        failure
    }

    fn panicked(handler: &str, stage: &str, panic: &(dyn Any + Send)) -> HttpFailure {
        let message = panic_message(panic);
        error!(
            handler = %handler,
            stage = %stage,
            panic_message = %message,
            "Handler panicked"
        );
        HttpFailure::internal(anyhow::anyhow!("{handler} {stage} panicked: {message}"))
    }
}
