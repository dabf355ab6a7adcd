//! Route template compilation.
//!
//! A template such as `/widgets/{id}/parts/{part}` becomes an anchored regex
//! plus one [`Conversion`] per placeholder. Matching is strict: integer and
//! boolean placeholders only accept text of the right shape, so a non-numeric
//! segment never matches an integer placeholder and the request falls through
//! to the next pattern (and, eventually, to Not Found).

use crate::error::CompileError;
use crate::resource::{
    ArgValue, BodyType, Converter, ConverterTable, IntWidth, ParamType, Renderer,
};
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::core::MAX_INLINE_PARAMS;

#[allow(clippy::expect_used)]
static PLACEHOLDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("placeholder name regex"));

/// Captured literal strings in placeholder order.
pub type Captures = SmallVec<[String; MAX_INLINE_PARAMS]>;

/// How a captured literal becomes an argument.
#[derive(Clone)]
pub enum Conversion {
    Text,
    Int(IntWidth),
    Bool,
    Custom {
        /// Converter name
        name: String,
        /// Registered conversion
        convert: Converter,
        /// Inverse of `convert`, when the converter has one
        render: Option<Renderer>,
    },
}

impl Conversion {
    fn segment_regex(&self) -> &'static str {
        match self {
            Conversion::Int(width) if width.is_signed() => "(-?[0-9]+)",
            Conversion::Int(_) => "([0-9]+)",
            Conversion::Bool => "(true|false)",
            Conversion::Text | Conversion::Custom { .. } => "([^/]+)",
        }
    }

    /// Percent-decode and convert a captured literal.
    pub fn apply(&self, raw: &str) -> Result<ArgValue, String> {
        let decoded = urlencoding::decode(raw)
            .map_err(|_| format!("'{raw}' is not valid percent-encoded UTF-8"))?;
        let raw: &str = &decoded;
        match self {
            Conversion::Text => Ok(ArgValue::Text(raw.to_string())),
            Conversion::Int(width) => width.convert(raw),
            Conversion::Bool => match raw {
                "true" => Ok(ArgValue::Bool(true)),
                "false" => Ok(ArgValue::Bool(false)),
                _ => Err(format!("'{raw}' is not a boolean")),
            },
            Conversion::Custom { name, convert, .. } => convert(raw)
                .map(ArgValue::Custom)
                .map_err(|e| format!("'{raw}' is not a valid {name}: {e}")),
        }
    }

    /// Render an argument back into a path segment, if it fits this conversion.
    #[must_use]
    pub fn render(&self, value: &ArgValue) -> Option<String> {
        match (self, value) {
            (Conversion::Text, ArgValue::Text(s)) if !s.is_empty() => Some(s.clone()),
            (Conversion::Int(width), v) if width.accepts(v) => match v {
                ArgValue::Int(n) => Some(n.to_string()),
                ArgValue::UInt(n) => Some(n.to_string()),
                _ => None,
            },
            (Conversion::Bool, ArgValue::Bool(b)) => Some(b.to_string()),
            (Conversion::Custom { render: Some(render), .. }, ArgValue::Custom(v)) => render(&**v),
            (Conversion::Custom { convert, .. }, ArgValue::Text(s)) if convert(s).is_ok() => {
                Some(s.clone())
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Text => write!(f, "Text"),
            Conversion::Int(width) => write!(f, "Int({width:?})"),
            Conversion::Bool => write!(f, "Bool"),
            Conversion::Custom { name, .. } => write!(f, "Custom({name})"),
        }
    }
}

/// A named placeholder and its conversion.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub name: Arc<str>,
    pub conversion: Conversion,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// Compiled matcher for one HTTP method and path template.
///
/// Identity is the template shape (placeholder names and types erased) plus
/// the method: two patterns that compare equal are duplicates.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    method: Method,
    template: String,
    area: Option<String>,
    shape: String,
    segments: Vec<Segment>,
    matcher: Regex,
    placeholders: Vec<Placeholder>,
    body: Option<BodyType>,
}

impl RoutePattern {
    /// Compile `template` for `method`.
    ///
    /// `params` lists every parameter of the constructor followed by the
    /// operation; path-bound ones are paired with placeholders in order. When
    /// `area` is given it is prepended as the first path segment.
    pub fn compile(
        template: &str,
        method: Method,
        area: Option<&str>,
        params: &[ParamType],
        converters: &ConverterTable,
    ) -> Result<Self, CompileError> {
        let full = match area {
            Some(area) => join_paths(&format!("/{}", area.trim_matches('/')), template),
            None => template.to_string(),
        };
        let malformed = |reason: &str| CompileError::Malformed {
            template: full.clone(),
            reason: reason.to_string(),
        };

        if !full.starts_with('/') {
            return Err(malformed("must start with '/'"));
        }

        let bodies: Vec<&BodyType> = params
            .iter()
            .filter_map(|p| match p {
                ParamType::Body(b) => Some(b),
                _ => None,
            })
            .collect();
        if bodies.len() > 1 {
            return Err(CompileError::MultipleBodies { template: full });
        }
        if bodies.len() == 1 && !params.last().is_some_and(ParamType::is_body) {
            return Err(CompileError::BodyNotLast { template: full });
        }
        let body = bodies.first().map(|b| (*b).clone());

        let path_params: Vec<&ParamType> = params.iter().filter(|p| p.is_path_bound()).collect();

        let trimmed = if full.len() > 1 {
            full.strip_suffix('/').unwrap_or(&full)
        } else {
            full.as_str()
        };

        let mut segments = Vec::new();
        let mut placeholders: Vec<Placeholder> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        if trimmed != "/" {
            for raw in trimmed[1..].split('/') {
                if raw.is_empty() {
                    return Err(malformed("empty path segment"));
                }
                if !raw.contains(['{', '}']) {
                    segments.push(Segment::Literal(raw.to_string()));
                    continue;
                }
                let name = raw
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .ok_or_else(|| malformed("placeholders must fill a whole segment"))?;
                if !PLACEHOLDER_NAME.is_match(name) {
                    return Err(malformed(&format!("invalid placeholder name '{name}'")));
                }
                if names.iter().any(|n| n == name) {
                    return Err(malformed(&format!("duplicate placeholder '{name}'")));
                }
                names.push(name.to_string());
                segments.push(Segment::Placeholder(names.len() - 1));
            }
        }

        if names.len() != path_params.len() {
            return Err(CompileError::ArityMismatch {
                template: full,
                placeholders: names.len(),
                parameters: path_params.len(),
            });
        }

        for (name, param) in names.iter().zip(&path_params) {
            let conversion = match param {
                ParamType::Int(width) => Conversion::Int(*width),
                ParamType::Bool => Conversion::Bool,
                ParamType::Custom(type_name) => Conversion::Custom {
                    convert: converters.get(type_name).ok_or_else(|| {
                        CompileError::UnknownConversion {
                            placeholder: name.clone(),
                            type_name: type_name.clone(),
                        }
                    })?,
                    render: converters.renderer(type_name),
                    name: type_name.clone(),
                },
                _ => Conversion::Text,
            };
            placeholders.push(Placeholder {
                name: Arc::from(name.as_str()),
                conversion,
            });
        }

        let mut pattern = String::with_capacity(trimmed.len() + 8);
        let mut shape = String::with_capacity(trimmed.len());
        pattern.push('^');
        for segment in &segments {
            pattern.push('/');
            shape.push('/');
            match segment {
                Segment::Literal(text) => {
                    pattern.push_str(&regex::escape(text));
                    shape.push_str(text);
                }
                Segment::Placeholder(i) => {
                    pattern.push_str(placeholders[*i].conversion.segment_regex());
                    shape.push_str("{}");
                }
            }
        }
        if segments.is_empty() {
            pattern.push('/');
            shape.push('/');
        }
        pattern.push('$');

        let matcher = Regex::new(&pattern).map_err(|e| malformed(&e.to_string()))?;

        Ok(Self {
            method,
            template: trimmed.to_string(),
            area: area.map(str::to_string),
            shape,
            segments,
            matcher,
            placeholders,
            body,
        })
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full template including area and prefix.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn area(&self) -> Option<&str> {
        self.area.as_deref()
    }

    /// Template with placeholders reduced to `{}`.
    #[must_use]
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// Regex source of the matcher.
    #[must_use]
    pub fn matcher_source(&self) -> &str {
        self.matcher.as_str()
    }

    #[must_use]
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    #[must_use]
    pub fn body(&self) -> Option<&BodyType> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Captured literals in placeholder order, still percent-encoded, or `None`.
    #[must_use]
    pub fn capture(&self, path: &str) -> Option<Captures> {
        let caps = self.matcher.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .collect(),
        )
    }

    /// Build a concrete path from rendered placeholder values.
    ///
    /// Returns `None` when the number of values does not match.
    #[must_use]
    pub fn expand(&self, values: &[String]) -> Option<String> {
        if values.len() != self.placeholders.len() {
            return None;
        }
        if self.segments.is_empty() {
            return Some("/".to_string());
        }
        let mut path = String::with_capacity(self.template.len());
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(i) => path.push_str(&urlencoding::encode(values.get(*i)?)),
            }
        }
        Some(path)
    }
}

impl PartialEq for RoutePattern {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.shape == other.shape
    }
}

impl Eq for RoutePattern {}

impl Hash for RoutePattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.shape.hash(state);
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// Join two path fragments with exactly one `/` between them.
pub(crate) fn join_paths(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    match (base.is_empty(), suffix.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{suffix}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{suffix}"),
    }
}
