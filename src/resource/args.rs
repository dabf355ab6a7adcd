use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One resolved constructor or operation argument.
#[derive(Clone)]
pub enum ArgValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    /// Value produced by a named converter
    Custom(Arc<dyn Any + Send + Sync>),
    /// Instance obtained from the service resolver
    Service(Arc<dyn Any + Send + Sync>),
    /// Parsed content body
    Body(Value),
}

impl ArgValue {
    pub fn text(value: impl Into<String>) -> Self {
        ArgValue::Text(value.into())
    }

    pub fn service<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        ArgValue::Service(value)
    }

    fn kind(&self) -> &'static str {
        match self {
            ArgValue::Text(_) => "text",
            ArgValue::Int(_) => "int",
            ArgValue::UInt(_) => "uint",
            ArgValue::Bool(_) => "bool",
            ArgValue::Custom(_) => "custom",
            ArgValue::Service(_) => "service",
            ArgValue::Body(_) => "body",
        }
    }

    /// JSON view used by validators; opaque values become `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Text(s) => Value::String(s.clone()),
            ArgValue::Int(n) => Value::from(*n),
            ArgValue::UInt(n) => Value::from(*n),
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Body(v) => v.clone(),
            ArgValue::Custom(_) | ArgValue::Service(_) => Value::Null,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(s) => write!(f, "Text({s:?})"),
            ArgValue::Int(n) => write!(f, "Int({n})"),
            ArgValue::UInt(n) => write!(f, "UInt({n})"),
            ArgValue::Bool(b) => write!(f, "Bool({b})"),
            ArgValue::Custom(_) => write!(f, "Custom(..)"),
            ArgValue::Service(_) => write!(f, "Service(..)"),
            ArgValue::Body(v) => write!(f, "Body({v})"),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArgValue::Text(a), ArgValue::Text(b)) => a == b,
            (ArgValue::Int(a), ArgValue::Int(b)) => a == b,
            (ArgValue::UInt(a), ArgValue::UInt(b)) => a == b,
            (ArgValue::Bool(a), ArgValue::Bool(b)) => a == b,
            (ArgValue::Body(a), ArgValue::Body(b)) => a == b,
            (ArgValue::Custom(a), ArgValue::Custom(b))
            | (ArgValue::Service(a), ArgValue::Service(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Resolved argument array handed to constructors and operations.
///
/// Accessors are positional and fail with a descriptive error when the
/// argument has a different kind than requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<ArgValue>,
}

impl Args {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    fn at(&self, index: usize) -> Result<&ArgValue> {
        self.values
            .get(index)
            .ok_or_else(|| anyhow!("argument {index} is missing ({} resolved)", self.values.len()))
    }

    fn mismatch(&self, index: usize, wanted: &str) -> anyhow::Error {
        let found = self.values.get(index).map_or("nothing", ArgValue::kind);
        anyhow!("argument {index} is {found}, not {wanted}")
    }

    pub fn text(&self, index: usize) -> Result<&str> {
        match self.at(index)? {
            ArgValue::Text(s) => Ok(s),
            _ => Err(self.mismatch(index, "text")),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.at(index)? {
            ArgValue::Int(n) => Ok(*n),
            ArgValue::UInt(n) => i64::try_from(*n).context("unsigned argument exceeds i64"),
            _ => Err(self.mismatch(index, "int")),
        }
    }

    pub fn uint(&self, index: usize) -> Result<u64> {
        match self.at(index)? {
            ArgValue::UInt(n) => Ok(*n),
            ArgValue::Int(n) => u64::try_from(*n).context("negative argument for unsigned"),
            _ => Err(self.mismatch(index, "uint")),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        match self.at(index)? {
            ArgValue::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(index, "bool")),
        }
    }

    pub fn custom<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        match self.at(index)? {
            ArgValue::Custom(v) => Arc::clone(v)
                .downcast::<T>()
                .map_err(|_| anyhow!("argument {index} is not a {}", std::any::type_name::<T>())),
            _ => Err(self.mismatch(index, "custom")),
        }
    }

    pub fn service<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        match self.at(index)? {
            ArgValue::Service(v) => Arc::clone(v)
                .downcast::<T>()
                .map_err(|_| anyhow!("argument {index} is not a {}", std::any::type_name::<T>())),
            _ => Err(self.mismatch(index, "service")),
        }
    }

    pub fn body_value(&self, index: usize) -> Result<&Value> {
        match self.at(index)? {
            ArgValue::Body(v) => Ok(v),
            _ => Err(self.mismatch(index, "body")),
        }
    }

    /// Deserialize the content body into `T`.
    pub fn body<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.body_value(index)?.clone();
        serde_json::from_value(value).context("content body does not fit the target type")
    }
}

impl From<Vec<ArgValue>> for Args {
    fn from(values: Vec<ArgValue>) -> Self {
        Self::new(values)
    }
}
