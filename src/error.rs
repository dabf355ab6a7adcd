//! Failure taxonomy for route compilation, registration and dispatch.
//!
//! Dispatch-time failures are plain values ([`HttpFailure`]) returned up the
//! call chain. [`HttpFailure::status`] is the only place that maps a failure
//! to an HTTP status code; the responder never guesses.

use crate::validator::Violation;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Error produced while compiling a route template into a [`RoutePattern`].
///
/// [`RoutePattern`]: crate::router::RoutePattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The template text is not a valid path template.
    Malformed {
        /// Template that failed to parse
        template: String,
        /// What is wrong with it
        reason: String,
    },
    /// A placeholder is bound to a custom type with no registered converter.
    UnknownConversion {
        /// Placeholder name
        placeholder: String,
        /// Custom type name
        type_name: String,
    },
    /// Number of placeholders differs from the number of path-bound parameters.
    ArityMismatch {
        /// Template that was compiled
        template: String,
        /// Placeholders found in the template
        placeholders: usize,
        /// Path-bound parameters declared by the operation
        parameters: usize,
    },
    /// More than one content-body parameter was declared.
    MultipleBodies {
        /// Template that was compiled
        template: String,
    },
    /// The content-body parameter is not the final parameter.
    BodyNotLast {
        /// Template that was compiled
        template: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Malformed { template, reason } => {
                write!(f, "malformed route template '{template}': {reason}")
            }
            CompileError::UnknownConversion {
                placeholder,
                type_name,
            } => write!(
                f,
                "placeholder '{placeholder}' has type '{type_name}' with no string conversion"
            ),
            CompileError::ArityMismatch {
                template,
                placeholders,
                parameters,
            } => write!(
                f,
                "route template '{template}' has {placeholders} placeholder(s) but the operation declares {parameters} path parameter(s)"
            ),
            CompileError::MultipleBodies { template } => {
                write!(f, "route '{template}' declares more than one content-body parameter")
            }
            CompileError::BodyNotLast { template } => {
                write!(f, "route '{template}' content-body parameter must be the last parameter")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Problem with a candidate handler type found during bulk registration.
///
/// These are reported per candidate and never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A resource must expose exactly one constructor.
    ConstructorCount {
        /// Resource name
        resource: String,
        /// Constructors found
        found: usize,
    },
    /// An operation's route could not be compiled.
    Compile {
        /// Resource name
        resource: String,
        /// Operation name
        operation: String,
        /// Underlying compile failure
        source: CompileError,
    },
    /// The constructor asks for something that is neither a service nor text-convertible.
    InvalidConstructorParameter {
        /// Resource name
        resource: String,
        /// Position of the offending parameter
        index: usize,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::ConstructorCount { resource, found } => write!(
                f,
                "resource '{resource}' must have exactly one constructor, found {found}"
            ),
            RegistrationError::Compile {
                resource,
                operation,
                source,
            } => write!(f, "cannot route {resource}::{operation}: {source}"),
            RegistrationError::InvalidConstructorParameter { resource, index } => write!(
                f,
                "resource '{resource}' constructor parameter {index} must be a service or a path parameter"
            ),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Compile { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// HTTP-shaped failure produced while matching, invoking or polling a request.
#[derive(Debug, Clone)]
pub enum HttpFailure {
    /// No route pattern accepts the path.
    NotFound,
    /// A pattern accepts the path but not the method.
    MethodNotAllowed {
        /// Methods registered for the matching pattern(s)
        allowed: Vec<Method>,
    },
    /// Parameter, conversion or body validation failed (client error).
    BadRequest {
        /// Human readable summary
        message: String,
        /// Individual violations
        violations: Vec<Violation>,
    },
    /// The request content type cannot be parsed.
    UnsupportedMediaType {
        /// Offending content type
        content_type: String,
    },
    /// None of the accepted response types can be produced.
    NotAcceptable {
        /// Accept header value
        accept: String,
    },
    /// The operation's return value broke its declared contract (server bug).
    BadResponse {
        /// Individual violations
        violations: Vec<Violation>,
    },
    /// An equivalent asynchronous submission is already in flight.
    Conflict {
        /// Key of the in-flight task
        key: String,
    },
    /// The execution service is shutting down.
    Rejected,
    /// The task was cancelled before it ran.
    Cancelled {
        /// Task key
        key: String,
    },
    /// The task was interrupted while running.
    Interrupted {
        /// Task key
        key: String,
    },
    /// A failure declared by domain code with an explicit status.
    Status {
        /// HTTP status code
        status: u16,
        /// Message shown to the caller
        message: String,
    },
    /// Anything unexpected; the cause is kept for logging only.
    Internal {
        /// Root cause
        cause: Arc<anyhow::Error>,
    },
}

impl HttpFailure {
    /// Domain failure with an explicit status code.
    pub fn status_with(status: u16, message: impl Into<String>) -> Self {
        HttpFailure::Status {
            status,
            message: message.into(),
        }
    }

    /// Bad request with a message and no structured violations.
    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpFailure::BadRequest {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// Wrap an unexpected error.
    pub fn internal(cause: anyhow::Error) -> Self {
        HttpFailure::Internal {
            cause: Arc::new(cause),
        }
    }

    /// Classify an error coming out of handler code.
    ///
    /// A root cause that is already an [`HttpFailure`] is returned unchanged;
    /// everything else becomes [`HttpFailure::Internal`].
    pub fn from_root_cause(err: anyhow::Error) -> Self {
        if let Some(failure) = err.root_cause().downcast_ref::<HttpFailure>() {
            return failure.clone();
        }
        HttpFailure::internal(err)
    }

    /// [`from_root_cause`](Self::from_root_cause) for a cause already shared
    /// with a finished task.
    pub fn from_shared_cause(cause: Arc<anyhow::Error>) -> Self {
        if let Some(failure) = cause.root_cause().downcast_ref::<HttpFailure>() {
            return failure.clone();
        }
        HttpFailure::Internal { cause }
    }

    /// HTTP status code for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            HttpFailure::NotFound => 404,
            HttpFailure::MethodNotAllowed { .. } => 405,
            HttpFailure::BadRequest { .. } => 400,
            HttpFailure::UnsupportedMediaType { .. } => 415,
            HttpFailure::NotAcceptable { .. } => 406,
            HttpFailure::BadResponse { .. } => 500,
            HttpFailure::Conflict { .. } => 409,
            HttpFailure::Rejected => 503,
            HttpFailure::Cancelled { .. } => 410,
            HttpFailure::Interrupted { .. } => 503,
            HttpFailure::Status { status, .. } => *status,
            HttpFailure::Internal { .. } => 500,
        }
    }

    /// Violations carried by validation failures.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            HttpFailure::BadRequest { violations, .. }
            | HttpFailure::BadResponse { violations } => violations,
            _ => &[],
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpFailure::NotFound => write!(f, "Not Found"),
            HttpFailure::MethodNotAllowed { .. } => write!(f, "Method Not Allowed"),
            HttpFailure::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            HttpFailure::UnsupportedMediaType { content_type } => {
                write!(f, "Unsupported Media Type: {content_type}")
            }
            HttpFailure::NotAcceptable { accept } => write!(f, "Not Acceptable: {accept}"),
            HttpFailure::BadResponse { violations } => write!(
                f,
                "response violates its declared contract ({} violation(s))",
                violations.len()
            ),
            HttpFailure::Conflict { key } => {
                write!(f, "an equivalent request is already running as {key}")
            }
            HttpFailure::Rejected => write!(f, "execution service is shutting down"),
            HttpFailure::Cancelled { key } => write!(f, "task {key} was cancelled"),
            HttpFailure::Interrupted { key } => write!(f, "task {key} was interrupted"),
            HttpFailure::Status { message, .. } => write!(f, "{message}"),
            // The cause is for logs, callers only see a generic message
            HttpFailure::Internal { .. } => write!(f, "Internal Server Error"),
        }
    }
}

impl std::error::Error for HttpFailure {}
