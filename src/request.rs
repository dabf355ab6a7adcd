//! Request view consumed by the router, the async bridge and the dispatcher.
//!
//! Wire-level parsing happens in the host's server; this is the already
//! parsed `(method, path, headers, body)` tuple plus the resolved caller
//! identity.

use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the common case.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Caller identity resolved by the host's authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(pub String);

/// Parsed inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    pub identity: Option<Identity>,
}

impl Request {
    /// Build a request; a `?query` suffix on `target` is split off.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderVec::new(),
            body: Vec::new(),
            identity: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a JSON body and the matching content type.
    #[must_use]
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(Identity(identity.into()));
        self
    }

    /// Header lookup, case-insensitive per RFC 7230.
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }
}
