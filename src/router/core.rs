//! Route registry: bulk registration, request matching and reverse lookup.
//!
//! Registration happens once at startup under a registry-wide lock and
//! publishes an immutable [`RouteTable`] through `ArcSwap`. Matching only
//! loads the current table, so any number of request threads can match
//! concurrently without contending on the registration lock.

use crate::content::ContentParser;
use crate::dispatcher::Invoker;
use crate::error::{HttpFailure, RegistrationError};
use crate::request::Request;
use crate::resource::{
    ArgValue, Args, BodyType, Constructor, ConverterTable, OperationDef, ParamType, Reply,
    ResourceDef,
};
use crate::services::ServiceResolver;
use crate::validator::Violation;
use arc_swap::ArcSwap;
use http::Method;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::pattern::{join_paths, Captures, RoutePattern};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated path parameter storage.
///
/// Names are shared with the compiled pattern; values are per-request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One registered (pattern, method) binding.
///
/// Owned by the route table and never mutated after registration.
pub struct MethodEntry {
    resource: String,
    constructor: Constructor,
    operation: Arc<OperationDef>,
    pattern: Arc<RoutePattern>,
}

impl MethodEntry {
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn operation(&self) -> &Arc<OperationDef> {
        &self.operation
    }

    #[must_use]
    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    #[must_use]
    pub fn pattern(&self) -> &Arc<RoutePattern> {
        &self.pattern
    }

    /// Arguments supplied to the constructor.
    #[must_use]
    pub fn constructor_arity(&self) -> usize {
        self.constructor.params().len()
    }

    /// Arguments supplied to the operation.
    #[must_use]
    pub fn operation_arity(&self) -> usize {
        self.operation.params().len()
    }

    #[must_use]
    pub fn body(&self) -> Option<&BodyType> {
        self.pattern.body()
    }

    /// `Resource::operation`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}::{}", self.resource, self.operation.name())
    }

    fn params(&self) -> impl Iterator<Item = &ParamType> {
        self.constructor
            .params()
            .iter()
            .chain(self.operation.params())
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("route", &self.pattern.to_string())
            .field("handler", &self.id())
            .finish()
    }
}

/// Result of registering one operation route.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    Added {
        /// `METHOD template`
        route: String,
        /// `Resource::operation`
        operation: String,
    },
    /// An equivalent route was already registered; the first one stays.
    DuplicateIgnored {
        route: String,
        operation: String,
        /// Operation that owns the route
        original: String,
    },
    Error(RegistrationError),
}

impl RegistrationOutcome {
    #[must_use]
    pub fn is_added(&self) -> bool {
        matches!(self, RegistrationOutcome::Added { .. })
    }
}

/// Entries sharing one compiled matcher.
#[derive(Clone)]
struct RouteSlot {
    matcher: String,
    pattern: Arc<RoutePattern>,
    entries: Vec<Arc<MethodEntry>>,
}

/// Immutable snapshot of all registered routes.
#[derive(Clone, Default)]
struct RouteTable {
    slots: Vec<RouteSlot>,
    by_shape: HashMap<(String, Method), Arc<MethodEntry>>,
}

impl RouteTable {
    fn insert(&mut self, entry: Arc<MethodEntry>) {
        let pattern = Arc::clone(&entry.pattern);
        self.by_shape.insert(
            (pattern.shape().to_string(), pattern.method().clone()),
            Arc::clone(&entry),
        );
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.matcher == pattern.matcher_source())
        {
            Some(slot) => slot.entries.push(entry),
            None => self.slots.push(RouteSlot {
                matcher: pattern.matcher_source().to_string(),
                pattern,
                entries: vec![entry],
            }),
        }
    }

    fn len(&self) -> usize {
        self.by_shape.len()
    }
}

/// A concrete match with resolved arguments.
#[derive(Debug)]
pub struct MatchedRoute {
    pub entry: Arc<MethodEntry>,
    /// Raw captured values by placeholder name
    pub path_params: ParamVec,
    pub constructor_args: Args,
    pub operation_args: Args,
    /// Conversion, service or body failure found while resolving arguments
    pub failure: Option<HttpFailure>,
}

impl MatchedRoute {
    /// Raw captured value of a placeholder.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of matching a request against the route table.
#[derive(Debug)]
pub enum RouteMatch {
    Found(MatchedRoute),
    NotFound,
    /// The path matched but no route accepts the method.
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
}

impl RouteMatch {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, RouteMatch::Found(_))
    }

    /// The concrete match, or the failure a sentinel stands for.
    pub fn into_result(self) -> Result<MatchedRoute, HttpFailure> {
        match self {
            RouteMatch::Found(matched) => Ok(matched),
            RouteMatch::NotFound => Err(HttpFailure::NotFound),
            RouteMatch::MethodNotAllowed { allowed } => {
                Err(HttpFailure::MethodNotAllowed { allowed })
            }
        }
    }

    /// Dispatch the match. Consumes it, so a match runs at most once.
    pub fn invoke(self, invoker: &Invoker) -> Result<Reply, HttpFailure> {
        invoker.invoke(self.into_result()?)
    }
}

/// Route registry.
pub struct Router {
    table: ArcSwap<RouteTable>,
    registration: Mutex<()>,
    converters: ConverterTable,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(ConverterTable::default())
    }
}

impl Router {
    /// Create an empty registry that resolves custom placeholder types with `converters`.
    #[must_use]
    pub fn new(converters: ConverterTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            registration: Mutex::new(()),
            converters,
        }
    }

    /// Register every routable resource.
    ///
    /// Problems are reported per operation and never abort the batch. A route
    /// equal to one already registered (same shape and method) is reported as
    /// a duplicate and the original stays in place.
    pub fn register<I>(&self, resources: I) -> Vec<RegistrationOutcome>
    where
        I: IntoIterator<Item = ResourceDef>,
    {
        let _guard = self.registration.lock();
        let mut table = RouteTable::clone(&self.table.load());
        let mut outcomes = Vec::new();

        for resource in resources {
            if !resource.is_routable() {
                debug!(resource = %resource.name(), "Skipping non-routable resource");
                continue;
            }
            match self.register_resource(&mut table, &resource) {
                Ok(mut added) => outcomes.append(&mut added),
                Err(err) => {
                    error!(resource = %resource.name(), error = %err, "Resource rejected");
                    outcomes.push(RegistrationOutcome::Error(err));
                }
            }
        }

        let routes_summary: Vec<String> = table
            .slots
            .iter()
            .flat_map(|slot| slot.entries.iter())
            .take(10)
            .map(|entry| entry.pattern.to_string())
            .collect();
        info!(
            routes_count = table.len(),
            routes_summary = ?routes_summary,
            outcomes = outcomes.len(),
            "Routing table loaded"
        );

        self.table.store(Arc::new(table));
        outcomes
    }

    fn register_resource(
        &self,
        table: &mut RouteTable,
        resource: &ResourceDef,
    ) -> Result<Vec<RegistrationOutcome>, RegistrationError> {
        let constructor = match resource.constructors() {
            [only] => only.clone(),
            other => {
                return Err(RegistrationError::ConstructorCount {
                    resource: resource.name().to_string(),
                    found: other.len(),
                })
            }
        };
        if let Some(index) = constructor.params().iter().position(ParamType::is_body) {
            return Err(RegistrationError::InvalidConstructorParameter {
                resource: resource.name().to_string(),
                index,
            });
        }

        let mut outcomes = Vec::new();
        for operation in resource.operations() {
            let methods = operation.http_methods();
            if methods.is_empty() {
                debug!(
                    resource = %resource.name(),
                    operation = %operation.name(),
                    "Operation answers no HTTP method"
                );
                continue;
            }

            let template = join_paths(resource.path_prefix(), operation.path());
            let params: Vec<ParamType> = constructor
                .params()
                .iter()
                .chain(operation.params())
                .cloned()
                .collect();

            for method in methods {
                let pattern = match RoutePattern::compile(
                    &template,
                    method,
                    resource.area_name(),
                    &params,
                    &self.converters,
                ) {
                    Ok(pattern) => Arc::new(pattern),
                    Err(source) => {
                        let err = RegistrationError::Compile {
                            resource: resource.name().to_string(),
                            operation: operation.name().to_string(),
                            source,
                        };
                        error!(error = %err, "Route compilation failed");
                        outcomes.push(RegistrationOutcome::Error(err));
                        continue;
                    }
                };

                let entry = Arc::new(MethodEntry {
                    resource: resource.name().to_string(),
                    constructor: constructor.clone(),
                    operation: Arc::clone(operation),
                    pattern,
                });
                let route = entry.pattern.to_string();
                let key = (
                    entry.pattern.shape().to_string(),
                    entry.pattern.method().clone(),
                );

                if let Some(original) = table.by_shape.get(&key) {
                    warn!(
                        route = %route,
                        handler = %entry.id(),
                        original = %original.id(),
                        "Duplicate route ignored"
                    );
                    outcomes.push(RegistrationOutcome::DuplicateIgnored {
                        route,
                        operation: entry.id(),
                        original: original.id(),
                    });
                    continue;
                }

                debug!(route = %route, handler = %entry.id(), "Route added");
                outcomes.push(RegistrationOutcome::Added {
                    route,
                    operation: entry.id(),
                });
                table.insert(entry);
            }
        }
        Ok(outcomes)
    }

    /// Find the entry for `method` and `path` without resolving arguments.
    ///
    /// Patterns are tried in registration order. Every pattern accepting the
    /// path contributes its methods to the `MethodNotAllowed` list.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<(Arc<MethodEntry>, Captures), HttpFailure> {
        let table = self.table.load();
        let mut allowed: Vec<Method> = Vec::new();

        for slot in &table.slots {
            if !slot.pattern.is_match(path) {
                continue;
            }
            if let Some(entry) = slot.entries.iter().find(|e| e.pattern.method() == method) {
                if let Some(captures) = entry.pattern.capture(path) {
                    return Ok((Arc::clone(entry), captures));
                }
            }
            for entry in &slot.entries {
                if !allowed.contains(entry.pattern.method()) {
                    allowed.push(entry.pattern.method().clone());
                }
            }
        }

        if allowed.is_empty() {
            debug!(method = %method, path = %path, "No route matched");
            Err(HttpFailure::NotFound)
        } else {
            debug!(method = %method, path = %path, allowed = ?allowed, "Method not allowed");
            Err(HttpFailure::MethodNotAllowed { allowed })
        }
    }

    /// Match a request and resolve constructor and operation arguments.
    ///
    /// Service parameters come from `services`, path parameters from the
    /// captured segments and the body parameter from `content`. A failure
    /// while resolving is attached to the match, not returned, so the
    /// invoker can report it as a structured result.
    pub fn match_request(
        &self,
        request: &Request,
        services: &dyn ServiceResolver,
        content: &dyn ContentParser,
    ) -> RouteMatch {
        let (entry, captures) = match self.lookup(&request.method, &request.path) {
            Ok(found) => found,
            Err(HttpFailure::MethodNotAllowed { allowed }) => {
                return RouteMatch::MethodNotAllowed { allowed }
            }
            Err(_) => return RouteMatch::NotFound,
        };

        let placeholders = entry.pattern.placeholders();
        let path_params: ParamVec = placeholders
            .iter()
            .zip(&captures)
            .map(|(p, raw)| (Arc::clone(&p.name), raw.clone()))
            .collect();

        let mut values = Vec::with_capacity(entry.constructor_arity() + entry.operation_arity());
        let mut failure = None;
        let mut next_capture = 0;
        for param in entry.params() {
            let resolved = match param {
                ParamType::Service(key) => services.resolve(key).map(ArgValue::Service).ok_or_else(
                    || {
                        HttpFailure::internal(anyhow::anyhow!(
                            "no service registered for {}",
                            key.name()
                        ))
                    },
                ),
                ParamType::Body(body) => content
                    .parse(&request.body, request.content_type(), body)
                    .map(ArgValue::Body),
                _ => {
                    let index = next_capture;
                    next_capture += 1;
                    match (placeholders.get(index), captures.get(index)) {
                        (Some(placeholder), Some(raw)) => {
                            placeholder.conversion.apply(raw).map_err(|message| {
                                HttpFailure::BadRequest {
                                    message: format!("invalid path parameter '{}'", placeholder.name),
                                    violations: vec![Violation::new(
                                        placeholder.name.as_ref(),
                                        "conversion",
                                        message,
                                    )],
                                }
                            })
                        }
                        _ => Err(HttpFailure::internal(anyhow::anyhow!(
                            "route {} has no capture {index}",
                            entry.pattern
                        ))),
                    }
                }
            };
            match resolved {
                Ok(value) => values.push(value),
                Err(err) => {
                    debug!(handler = %entry.id(), error = %err, "Argument resolution failed");
                    failure = Some(err);
                    break;
                }
            }
        }

        let (constructor_args, operation_args) = if failure.is_none() {
            let operation_values = values.split_off(entry.constructor_arity());
            (Args::new(values), Args::new(operation_values))
        } else {
            (Args::default(), Args::default())
        };

        debug!(
            method = %request.method,
            path = %request.path,
            handler = %entry.id(),
            path_params = ?path_params,
            "Route matched"
        );

        RouteMatch::Found(MatchedRoute {
            entry,
            path_params,
            constructor_args,
            operation_args,
            failure,
        })
    }

    /// First registered path for `resource::operation` that fits `args`.
    ///
    /// `args` lists the non-body parameters in declaration order, constructor
    /// parameters first. Each must be assignable to its declared type.
    #[must_use]
    pub fn find_path_to(&self, resource: &str, operation: &str, args: &[ArgValue]) -> Option<String> {
        let table = self.table.load();
        table
            .slots
            .iter()
            .flat_map(|slot| slot.entries.iter())
            .filter(|entry| entry.resource == resource && entry.operation.name() == operation)
            .find_map(|entry| Self::render_path(entry, args))
    }

    fn render_path(entry: &MethodEntry, args: &[ArgValue]) -> Option<String> {
        let declared: Vec<&ParamType> = entry.params().filter(|p| !p.is_body()).collect();
        if declared.len() != args.len() {
            return None;
        }
        let placeholders = entry.pattern.placeholders();
        let mut rendered = Vec::with_capacity(placeholders.len());
        for (param, arg) in declared.into_iter().zip(args) {
            match param {
                ParamType::Service(key) => match arg {
                    ArgValue::Service(value) if key.admits(value) => {}
                    _ => return None,
                },
                _ => {
                    let placeholder = placeholders.get(rendered.len())?;
                    rendered.push(placeholder.conversion.render(arg)?);
                }
            }
        }
        entry.pattern.expand(&rendered)
    }

    /// Registered routes as `(method, template, "Resource::operation")`.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String, String)> {
        self.table
            .load()
            .slots
            .iter()
            .flat_map(|slot| slot.entries.iter())
            .map(|entry| {
                (
                    entry.pattern.method().clone(),
                    entry.pattern.template().to_string(),
                    entry.id(),
                )
            })
            .collect()
    }

    /// Log every registered route.
    pub fn dump_routes(&self) {
        for (method, template, handler) in self.routes() {
            info!(method = %method, route = %template, handler = %handler, "Registered route");
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.load().len())
            .field("converters", &self.converters)
            .finish()
    }
}
