use super::args::ArgValue;
use crate::services::ServiceKey;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Width of an integer placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntWidth {
    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(self, IntWidth::I8 | IntWidth::I16 | IntWidth::I32 | IntWidth::I64)
    }

    fn bounds(self) -> (i128, i128) {
        match self {
            IntWidth::I8 => (i8::MIN.into(), i8::MAX.into()),
            IntWidth::I16 => (i16::MIN.into(), i16::MAX.into()),
            IntWidth::I32 => (i32::MIN.into(), i32::MAX.into()),
            IntWidth::I64 => (i64::MIN.into(), i64::MAX.into()),
            IntWidth::U8 => (0, u8::MAX.into()),
            IntWidth::U16 => (0, u16::MAX.into()),
            IntWidth::U32 => (0, u32::MAX.into()),
            IntWidth::U64 => (0, u64::MAX.into()),
        }
    }

    fn admits(self, n: i128) -> bool {
        let (lo, hi) = self.bounds();
        (lo..=hi).contains(&n)
    }

    /// Convert a captured literal into an integer argument of this width.
    pub fn convert(self, raw: &str) -> Result<ArgValue, String> {
        let n: i128 = raw
            .parse()
            .map_err(|_| format!("'{raw}' is not an integer"))?;
        self.to_arg(n)
            .ok_or_else(|| format!("{raw} is out of range for {self:?}"))
    }

    fn to_arg(self, n: i128) -> Option<ArgValue> {
        if !self.admits(n) {
            return None;
        }
        if self.is_signed() {
            i64::try_from(n).ok().map(ArgValue::Int)
        } else {
            u64::try_from(n).ok().map(ArgValue::UInt)
        }
    }

    /// Whether an already typed argument fits this width.
    #[must_use]
    pub fn accepts(self, value: &ArgValue) -> bool {
        match value {
            ArgValue::Int(n) => self.admits(i128::from(*n)),
            ArgValue::UInt(n) => self.admits(i128::from(*n)),
            _ => false,
        }
    }
}

/// Declared type of a request content body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyType {
    /// Name used in diagnostics
    pub name: String,
    /// Optional JSON Schema the parsed body must satisfy
    pub schema: Option<Value>,
}

impl BodyType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Declared type of one constructor or operation parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Path segment kept as text
    Text,
    /// Path segment converted to an integer
    Int(IntWidth),
    /// Path segment converted to `true`/`false`
    Bool,
    /// Path segment converted by a named converter from a [`ConverterTable`]
    Custom(String),
    /// Resolved from the [`ServiceResolver`](crate::services::ServiceResolver)
    Service(ServiceKey),
    /// Parsed from the request content body
    Body(BodyType),
}

impl ParamType {
    pub fn service<T: Any>() -> Self {
        ParamType::Service(ServiceKey::of::<T>())
    }

    pub fn body(name: impl Into<String>) -> Self {
        ParamType::Body(BodyType::new(name))
    }

    pub fn custom(name: impl Into<String>) -> Self {
        ParamType::Custom(name.into())
    }

    /// Parameters filled from a path placeholder.
    #[must_use]
    pub fn is_path_bound(&self) -> bool {
        matches!(
            self,
            ParamType::Text | ParamType::Int(_) | ParamType::Bool | ParamType::Custom(_)
        )
    }

    #[must_use]
    pub fn is_body(&self) -> bool {
        matches!(self, ParamType::Body(_))
    }
}

/// Parses a path segment into a custom argument value.
pub type Converter =
    Arc<dyn Fn(&str) -> Result<Arc<dyn Any + Send + Sync>, String> + Send + Sync>;

/// Turns a converted value back into its path segment text.
pub type Renderer = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<String> + Send + Sync>;

#[derive(Clone)]
struct Registered {
    convert: Converter,
    render: Option<Renderer>,
}

/// Named string-to-value conversions for [`ParamType::Custom`] placeholders.
#[derive(Clone, Default)]
pub struct ConverterTable {
    converters: HashMap<String, Registered>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register any `FromStr` type under `name`. Its `Display` form is used
    /// when a path is rendered back from a converted value.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: FromStr + fmt::Display + Any + Send + Sync,
        T::Err: fmt::Display,
    {
        self.converters.insert(
            name.into(),
            Registered {
                convert: Arc::new(|raw: &str| {
                    raw.parse::<T>()
                        .map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
                        .map_err(|e| e.to_string())
                }),
                render: Some(Arc::new(|value: &(dyn Any + Send + Sync)| {
                    value.downcast_ref::<T>().map(ToString::to_string)
                })),
            },
        );
    }

    /// Register a bare conversion. Reverse lookup then only accepts the text form.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, convert: F)
    where
        F: Fn(&str) -> Result<Arc<dyn Any + Send + Sync>, String> + Send + Sync + 'static,
    {
        self.converters.insert(
            name.into(),
            Registered {
                convert: Arc::new(convert),
                render: None,
            },
        );
    }

    #[must_use]
    pub fn with<T>(mut self, name: impl Into<String>) -> Self
    where
        T: FromStr + fmt::Display + Any + Send + Sync,
        T::Err: fmt::Display,
    {
        self.register::<T>(name);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Converter> {
        self.converters.get(name).map(|r| Arc::clone(&r.convert))
    }

    #[must_use]
    pub fn renderer(&self, name: &str) -> Option<Renderer> {
        self.converters.get(name)?.render.as_ref().map(Arc::clone)
    }
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.converters.keys()).finish()
    }
}
