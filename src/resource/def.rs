use super::{Args, ParamType, Reply};
use anyhow::{anyhow, Result};
use http::Method;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased handler instance produced by a constructor.
pub type Instance = Arc<dyn Any + Send + Sync>;

type BuildFn = Arc<dyn Fn(Args) -> Result<Instance> + Send + Sync>;
type CallFn = Arc<dyn Fn(&Instance, Args) -> Result<Reply> + Send + Sync>;

/// Policy deciding whether a new asynchronous submission clashes with one in flight.
///
/// Every rule only compares submissions of the same operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectRule {
    /// Never reject
    #[default]
    None,
    /// Same method and path
    SamePath,
    /// Same path and same body content
    SameContent,
    /// Same caller identity
    SameIdentity,
    /// Same caller identity and same content
    Both,
}

/// How a handler instance is built.
#[derive(Clone)]
pub struct Constructor {
    params: Vec<ParamType>,
    build: BuildFn,
}

impl Constructor {
    #[must_use]
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn build(&self, args: Args) -> Result<Instance> {
        (self.build)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// One routable operation of a resource.
#[derive(Clone)]
pub struct OperationDef {
    name: String,
    path: String,
    methods: Vec<Method>,
    params: Vec<ParamType>,
    response_schema: Option<Value>,
    asynchronous: bool,
    reject: RejectRule,
    key_prefix: Option<String>,
    call: CallFn,
}

impl OperationDef {
    /// Declare an operation on handler type `H`.
    ///
    /// `path` is appended to the resource prefix. Parameters are listed in the
    /// order `call` receives them in its [`Args`].
    pub fn new<H, F>(name: impl Into<String>, path: impl Into<String>, params: Vec<ParamType>, call: F) -> Self
    where
        H: Any + Send + Sync,
        F: Fn(&H, Args) -> Result<Reply> + Send + Sync + 'static,
    {
        let call: CallFn = Arc::new(move |instance: &Instance, args: Args| {
            let handler = instance.downcast_ref::<H>().ok_or_else(|| {
                anyhow!("handler instance is not a {}", std::any::type_name::<H>())
            })?;
            call(handler, args)
        });
        Self {
            name: name.into(),
            path: path.into(),
            methods: Vec::new(),
            params,
            response_schema: None,
            asynchronous: false,
            reject: RejectRule::None,
            key_prefix: None,
            call,
        }
    }

    /// Tag the operation with an HTTP method, overriding the naming convention.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// JSON Schema the operation's JSON replies must satisfy.
    #[must_use]
    pub fn response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Always run on the execution service.
    #[must_use]
    pub fn asynchronous(mut self, reject: RejectRule) -> Self {
        self.asynchronous = true;
        self.reject = reject;
        self
    }

    /// Rejection rule applied when the operation returns deferred work.
    #[must_use]
    pub fn reject(mut self, reject: RejectRule) -> Self {
        self.reject = reject;
        self
    }

    /// Use `<prefix>-<n>` task keys instead of random ones.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    #[must_use]
    pub fn response_schema_ref(&self) -> Option<&Value> {
        self.response_schema.as_ref()
    }

    #[must_use]
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    #[must_use]
    pub fn reject_rule(&self) -> RejectRule {
        self.reject
    }

    #[must_use]
    pub fn task_key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }

    /// Methods this operation answers.
    ///
    /// Explicit tags win; otherwise the leading word of the name decides
    /// (`get`, `get_widget`, `post_order`, ...). Unrecognised names answer none.
    #[must_use]
    pub fn http_methods(&self) -> Vec<Method> {
        if !self.methods.is_empty() {
            return self.methods.clone();
        }
        let verb = self
            .name
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let method = match verb.as_str() {
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "delete" => Method::DELETE,
            "patch" => Method::PATCH,
            "head" => Method::HEAD,
            "options" => Method::OPTIONS,
            _ => return Vec::new(),
        };
        vec![method]
    }

    pub fn call(&self, instance: &Instance, args: Args) -> Result<Reply> {
        (self.call)(instance, args)
    }
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("params", &self.params)
            .field("asynchronous", &self.asynchronous)
            .field("reject", &self.reject)
            .finish_non_exhaustive()
    }
}

/// Registration record for one handler type.
///
/// ```rust,ignore
/// let widgets = ResourceDef::new("Widgets")
///     .prefix("/widgets")
///     .constructor(vec![ParamType::service::<Store>()], |args| {
///         Ok(Widgets { store: args.service::<Store>(0)? })
///     })
///     .operation(OperationDef::new(
///         "get_widget",
///         "/{id}",
///         vec![ParamType::Int(IntWidth::I64)],
///         |w: &Widgets, args| w.get(args.int(0)?),
///     ));
/// ```
#[derive(Clone, Debug)]
pub struct ResourceDef {
    name: String,
    area: Option<String>,
    prefix: String,
    routable: bool,
    constructors: Vec<Constructor>,
    operations: Vec<Arc<OperationDef>>,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            area: None,
            prefix: String::new(),
            routable: true,
            constructors: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Area prepended before the prefix, e.g. `admin` → `/admin/...`.
    #[must_use]
    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    /// Path prefix shared by all operations.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Exclude this resource from bulk registration.
    #[must_use]
    pub fn non_routable(mut self) -> Self {
        self.routable = false;
        self
    }

    /// Add a constructor producing `H`.
    #[must_use]
    pub fn constructor<H, F>(mut self, params: Vec<ParamType>, build: F) -> Self
    where
        H: Any + Send + Sync,
        F: Fn(Args) -> Result<H> + Send + Sync + 'static,
    {
        let build: BuildFn = Arc::new(move |args: Args| Ok(Arc::new(build(args)?) as Instance));
        self.constructors.push(Constructor { params, build });
        self
    }

    /// Constructor for handler types without dependencies.
    #[must_use]
    pub fn unit<H>(self, handler: H) -> Self
    where
        H: Any + Send + Sync + Clone,
    {
        self.constructor(Vec::new(), move |_| Ok(handler.clone()))
    }

    #[must_use]
    pub fn operation(mut self, operation: OperationDef) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn area_name(&self) -> Option<&str> {
        self.area.as_deref()
    }

    #[must_use]
    pub fn path_prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.routable
    }

    #[must_use]
    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    #[must_use]
    pub fn operations(&self) -> &[Arc<OperationDef>] {
        &self.operations
    }
}
