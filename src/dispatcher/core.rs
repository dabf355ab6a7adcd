//! Dispatcher core: the per-request hot path.

use super::invoker::Invoker;
use crate::bridge::AsyncBridge;
use crate::content::{ContentParser, JsonContent};
use crate::executor::ExecutionService;
use crate::request::Request;
use crate::response::Response;
use crate::router::{RouteMatch, Router};
use crate::runtime_config::RuntimeConfig;
use crate::services::{ScopedResolver, ServiceMap, ServiceResolver};
use crate::validator::Validator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Request entry point: match, dispatch, render.
///
/// Handlers can ask for the current [`Request`] and
/// [`Identity`](crate::request::Identity) as service parameters.
pub struct Dispatcher {
    router: Arc<Router>,
    bridge: AsyncBridge,
    services: Arc<dyn ServiceResolver>,
    content: Arc<dyn ContentParser>,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        bridge: AsyncBridge,
        services: Arc<dyn ServiceResolver>,
        content: Arc<dyn ContentParser>,
    ) -> Self {
        Self {
            router,
            bridge,
            services,
            content,
        }
    }

    /// Wire a dispatcher with a JSON codec and an execution service built from `config`.
    pub fn from_config(
        config: &RuntimeConfig,
        router: Arc<Router>,
        validator: Arc<dyn Validator>,
        services: Arc<dyn ServiceResolver>,
    ) -> Self {
        let bridge = AsyncBridge::new(
            ExecutionService::new(config.executor.clone()),
            Arc::new(Invoker::new(validator)),
            config.status_prefix.clone(),
        );
        Self::new(router, bridge, services, Arc::new(JsonContent))
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn bridge(&self) -> &AsyncBridge {
        &self.bridge
    }

    /// Dispatch one request. Always produces a response.
    pub fn dispatch(&self, request: &Request) -> Response {
        let started = Instant::now();

        let route = if self.bridge.is_status_path(&request.path) {
            RouteMatch::NotFound
        } else {
            let mut scope = ServiceMap::new();
            scope.insert(request.clone());
            if let Some(identity) = &request.identity {
                scope.insert(identity.clone());
            }
            let resolver = ScopedResolver::new(scope, self.services.as_ref());
            self.router
                .match_request(request, &resolver, self.content.as_ref())
        };

        let outcome = self.bridge.invoke(request, route);
        let response = Response::from_outcome(outcome, request.accept(), self.content.as_ref());

        let duration = started.elapsed();
        if duration > Duration::from_millis(500) {
            warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                duration_ms = duration.as_millis(),
                "Slow request"
            );
        } else {
            info!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                duration_us = duration.as_micros(),
                "Request dispatched"
            );
        }
        response
    }

    /// Stop the execution service; see [`ExecutionService::shutdown`].
    pub fn shutdown(&self, may_interrupt: bool) {
        self.bridge.executor().shutdown(may_interrupt);
    }
}
