//! Rendering of dispatch outcomes.
//!
//! The status code always comes from the outcome: [`HttpFailure::status`] for
//! failures and the [`Reply`] variant otherwise. Failure bodies are JSON:
//!
//! ```json
//! {"error": "Bad Request", "status": 400, "message": "...", "violations": [...]}
//! ```

use crate::bridge::Dispatched;
use crate::content::ContentParser;
use crate::error::HttpFailure;
use crate::request::HeaderVec;
use crate::resource::Reply;
use http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

/// Rendered response handed back to the host's server.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    /// JSON response without content negotiation.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        let mut response = Self::new(status);
        response.set_header("content-type", "application/json".to_string());
        response.body = body.to_string().into_bytes();
        response
    }

    /// Render a dispatch outcome, negotiating JSON bodies against `accept`.
    pub fn from_outcome(
        outcome: Result<Dispatched, HttpFailure>,
        accept: Option<&str>,
        content: &dyn ContentParser,
    ) -> Self {
        match outcome {
            Ok(Dispatched::Complete(reply)) => Self::from_reply(reply, accept, content),
            Ok(Dispatched::Pending(handle)) => {
                let mut response = Self::json(
                    202,
                    &json!({"key": handle.key().as_str(), "state": handle.state()}),
                );
                response.set_header("retry-after", "1".to_string());
                response
            }
            Err(failure) => Self::from_failure(&failure),
        }
    }

    /// Render an operation reply.
    pub fn from_reply(reply: Reply, accept: Option<&str>, content: &dyn ContentParser) -> Self {
        match reply {
            Reply::Json(value) => match content.produce(&value, accept) {
                Ok((body, content_type)) => {
                    let mut response = Self::new(200);
                    response.set_header("content-type", content_type);
                    response.body = body;
                    response
                }
                Err(failure) => Self::from_failure(&failure),
            },
            Reply::Text(text) => {
                let mut response = Self::new(200);
                response.set_header("content-type", "text/plain; charset=utf-8".to_string());
                response.body = text.into_bytes();
                response
            }
            Reply::Empty => Self::new(204),
            Reply::Redirect(location) => Self::redirect(302, location),
            Reply::SeeOther(location) => Self::redirect(303, location),
            Reply::Accepted { key, location } => {
                let mut response = Self::json(202, &json!({"key": key, "location": location}));
                response.set_header("location", location);
                response
            }
            Reply::Deferred(_) => {
                error!("Deferred reply reached the responder");
                Self::from_failure(&HttpFailure::internal(anyhow::anyhow!(
                    "deferred reply was not submitted"
                )))
            }
        }
    }

    fn redirect(status: u16, location: String) -> Self {
        let mut response = Self::new(status);
        response.set_header("location", location);
        response
    }

    /// Render a failure as a JSON error document.
    #[must_use]
    pub fn from_failure(failure: &HttpFailure) -> Self {
        let status = failure.status();
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Error");
        let mut body = json!({
            "error": reason,
            "status": status,
            "message": failure.to_string(),
        });
        if !failure.violations().is_empty() {
            body["violations"] = json!(failure.violations());
        }

        let mut response = Self::json(status, &body);
        if let HttpFailure::MethodNotAllowed { allowed } = failure {
            let allow: Vec<&str> = allowed.iter().map(http::Method::as_str).collect();
            response.set_header("allow", allow.join(", "));
        }
        response
    }

    /// Header lookup, case-insensitive.
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Body parsed as JSON, if it is JSON.
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::JsonContent;
    use crate::validator::Violation;
    use http::Method;

    #[test]
    fn test_method_not_allowed_lists_allowed_methods() {
        let response = Response::from_failure(&HttpFailure::MethodNotAllowed {
            allowed: vec![Method::GET, Method::DELETE],
        });
        assert_eq!(response.status, 405);
        assert_eq!(response.get_header("Allow"), Some("GET, DELETE"));
        assert_eq!(response.json_body().unwrap()["error"], "Method Not Allowed");
    }

    #[test]
    fn test_bad_request_carries_violations() {
        let response = Response::from_failure(&HttpFailure::BadRequest {
            message: "invalid".into(),
            violations: vec![Violation::new("id", "conversion", "out of range")],
        });
        let body = response.json_body().unwrap();
        assert_eq!(body["status"], 400);
        assert_eq!(body["violations"][0]["location"], "id");
    }

    #[test]
    fn test_internal_cause_is_not_exposed() {
        let response = Response::from_failure(&HttpFailure::internal(anyhow::anyhow!("db password wrong")));
        assert_eq!(response.status, 500);
        let body = String::from_utf8(response.body).unwrap();
        assert!(!body.contains("password"));
    }

    #[test]
    fn test_reply_rendering() {
        let accepted = Response::from_reply(
            Reply::Accepted {
                key: "k".into(),
                location: "/_status/k".into(),
            },
            None,
            &JsonContent,
        );
        assert_eq!(accepted.status, 202);
        assert_eq!(accepted.get_header("location"), Some("/_status/k"));

        let see_other = Response::from_reply(Reply::SeeOther("/w/1".into()), None, &JsonContent);
        assert_eq!(see_other.status, 303);
        assert_eq!(Response::from_reply(Reply::Empty, None, &JsonContent).status, 204);

        let refused = Response::from_reply(Reply::Json(json!({})), Some("text/html"), &JsonContent);
        assert_eq!(refused.status, 406);
    }
}
