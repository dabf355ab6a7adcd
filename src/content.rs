//! Content parsing and production.
//!
//! Codecs are supplied by the host. The router asks a [`ContentParser`] to turn
//! request bytes into a JSON value for content-body parameters, and the
//! responder asks it to render JSON replies for the caller's `Accept` header.
//! [`JsonContent`] handles `application/json` and `+json` media types.

use crate::error::HttpFailure;
use crate::resource::BodyType;
use crate::validator::Violation;
use serde_json::Value;

/// Content parser/producer contract.
pub trait ContentParser: Send + Sync {
    /// Parse a request body declared as `target`.
    ///
    /// Fails with `UnsupportedMediaType` for content types the parser does not
    /// handle and with `BadRequest` for unreadable content.
    fn parse(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        target: &BodyType,
    ) -> Result<Value, HttpFailure>;

    /// Render `value` for the given `Accept` header; returns bytes and content type.
    fn produce(&self, value: &Value, accept: Option<&str>) -> Result<(Vec<u8>, String), HttpFailure>;
}

/// JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContent;

const JSON: &str = "application/json";

fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media: &str) -> bool {
    media == JSON || (media.starts_with("application/") && media.ends_with("+json"))
}

fn accepts_json(accept: &str) -> bool {
    accept.split(',').map(media_type).any(|media| {
        media.is_empty() || media == "*/*" || media == "application/*" || is_json(&media)
    })
}

impl ContentParser for JsonContent {
    fn parse(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        target: &BodyType,
    ) -> Result<Value, HttpFailure> {
        // A missing content type is read as JSON
        if let Some(content_type) = content_type {
            if !is_json(&media_type(content_type)) {
                return Err(HttpFailure::UnsupportedMediaType {
                    content_type: content_type.to_string(),
                });
            }
        }
        if body.is_empty() {
            return Err(HttpFailure::BadRequest {
                message: format!("missing {} content", target.name),
                violations: vec![Violation::new(&target.name, "required", "request body is empty")],
            });
        }
        serde_json::from_slice(body).map_err(|e| HttpFailure::BadRequest {
            message: format!("unreadable {} content", target.name),
            violations: vec![Violation::new(&target.name, "syntax", e.to_string())],
        })
    }

    fn produce(&self, value: &Value, accept: Option<&str>) -> Result<(Vec<u8>, String), HttpFailure> {
        match accept {
            Some(accept) if !accepts_json(accept) => Err(HttpFailure::NotAcceptable {
                accept: accept.to_string(),
            }),
            _ => Ok((value.to_string().into_bytes(), JSON.to_string())),
        }
    }
}
