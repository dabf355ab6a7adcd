//! # Switchyard
//!
//! **Switchyard** is the request-dispatch core of a microservice host. It turns
//! an incoming method and path into a call on a registered handler, binds and
//! validates typed parameters, and can defer the call to a background worker
//! pool whose tasks are polled by key.
//!
//! ## Architecture
//!
//! - **[`resource`]** - Handler side table: resources, constructors, operations, parameter types
//! - **[`router`]** - Pattern compiler and route registry (register, match, reverse lookup)
//! - **[`dispatcher`]** - Invoker and the [`Dispatcher`] entry point
//! - **[`executor`]** - Worker pool with keyed, cancellable, retained tasks
//! - **[`bridge`]** - Status polls, asynchronous submission and duplicate rejection
//! - **[`services`]**, **[`content`]**, **[`validator`]** - Collaborator contracts
//! - **[`response`]** - Rendering outcomes into status, headers and body
//!
//! ## Request Flow
//!
//! ```text
//! Request ─▶ Router::match_request ─▶ RouteMatch
//!                                       │
//!                                       ▼
//!                                  AsyncBridge ──▶ status poll ─▶ ExecutionService::get
//!                                       │
//!                       ┌───────────────┴───────────────┐
//!                       ▼                               ▼
//!                  Invoker (sync)            ExecutionService::submit
//!                       │                               │
//!                       ▼                               ▼
//!                     Reply                   202 Accepted + Location
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! #[derive(Clone)]
//! struct Widgets;
//!
//! let router = Arc::new(Router::default());
//! router.register(vec![ResourceDef::new("Widgets")
//!     .prefix("/widgets")
//!     .unit(Widgets)
//!     .operation(OperationDef::new(
//!         "get_widget",
//!         "/{id}",
//!         vec![ParamType::Int(IntWidth::I64)],
//!         |_: &Widgets, args| Ok(Reply::Json(json!({"id": args.int(0)?}))),
//!     ))]);
//!
//! let dispatcher = Dispatcher::from_config(
//!     &RuntimeConfig::from_env(),
//!     router,
//!     Arc::new(SchemaValidator::new()),
//!     Arc::new(ServiceMap::new()),
//! );
//! let response = dispatcher.dispatch(&Request::new(Method::GET, "/widgets/42"));
//! assert_eq!(response.status, 200);
//! ```

pub mod bridge;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod ids;
pub mod logging;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod services;
pub mod validator;

pub use bridge::{AsyncBridge, Dispatched};
pub use dispatcher::{Dispatcher, Invoker};
pub use error::{CompileError, HttpFailure, RegistrationError};
pub use executor::{ExecutionService, ExecutorConfig, TaskError, TaskHandle, TaskState};
pub use ids::TaskKey;
pub use request::{Identity, Request};
pub use response::Response;
pub use router::{RegistrationOutcome, RouteMatch, Router};
pub use runtime_config::RuntimeConfig;

/// Common imports for handler code.
pub mod prelude {
    pub use crate::content::JsonContent;
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::HttpFailure;
    pub use crate::request::{Identity, Request};
    pub use crate::resource::{
        ArgValue, Args, BodyType, IntWidth, OperationDef, ParamType, RejectRule, Reply,
        ResourceDef,
    };
    pub use crate::router::Router;
    pub use crate::runtime_config::RuntimeConfig;
    pub use crate::services::ServiceMap;
    pub use crate::validator::SchemaValidator;
    pub use http::Method;
    pub use serde_json::json;
    pub use std::sync::Arc;
}
