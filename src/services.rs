//! Service resolution for parameters that do not come from the path.
//!
//! Constructor and operation parameters declared as
//! [`ParamType::Service`](crate::resource::ParamType::Service) are satisfied by
//! a [`ServiceResolver`]. The dependency-injection container itself lives in
//! the host; [`ServiceMap`] is the minimal type-keyed implementation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared, type-erased service instance.
pub type ServiceRef = Arc<dyn Any + Send + Sync>;

/// Identity of a service type.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `value` is an instance of this service type.
    #[must_use]
    pub fn admits(&self, value: &ServiceRef) -> bool {
        value.as_ref().type_id() == self.id
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

/// Resolves service-typed parameters.
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self, key: &ServiceKey) -> Option<ServiceRef>;

    fn contains(&self, key: &ServiceKey) -> bool {
        self.resolve(key).is_some()
    }
}

/// Type-keyed service table.
#[derive(Clone, Default)]
pub struct ServiceMap {
    services: HashMap<TypeId, ServiceRef>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, replacing any previous instance of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Register an already shared instance.
    pub fn insert_arc<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceResolver for ServiceMap {
    fn resolve(&self, key: &ServiceKey) -> Option<ServiceRef> {
        self.services.get(&key.id).map(Arc::clone)
    }

    fn contains(&self, key: &ServiceKey) -> bool {
        self.services.contains_key(&key.id)
    }
}

/// Per-request resolver: contextual values first, then the host's services.
pub struct ScopedResolver<'a> {
    scope: ServiceMap,
    parent: &'a dyn ServiceResolver,
}

impl<'a> ScopedResolver<'a> {
    pub fn new(scope: ServiceMap, parent: &'a dyn ServiceResolver) -> Self {
        Self { scope, parent }
    }
}

impl ServiceResolver for ScopedResolver<'_> {
    fn resolve(&self, key: &ServiceKey) -> Option<ServiceRef> {
        self.scope.resolve(key).or_else(|| self.parent.resolve(key))
    }

    fn contains(&self, key: &ServiceKey) -> bool {
        self.scope.contains(key) || self.parent.contains(key)
    }
}
