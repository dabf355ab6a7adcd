//! # Resource Module
//!
//! Handler types are described once at startup by a [`ResourceDef`]: its area,
//! path prefix, single constructor and operations. This side table is what the
//! route registry compiles into patterns and what the invoker calls through.
//!
//! ## Parameters
//!
//! Every constructor and operation parameter has a [`ParamType`]:
//!
//! - `Text`, `Int`, `Bool` and `Custom` are filled from path placeholders, in
//!   declaration order (constructor parameters first)
//! - `Service` is resolved from the host's
//!   [`ServiceResolver`](crate::services::ServiceResolver)
//! - `Body` is parsed from the request content and must be the last
//!   operation parameter
//!
//! Resolved values reach handler code as positional [`Args`].

mod args;
mod def;
mod params;
mod reply;

pub use args::{ArgValue, Args};
pub use def::{Constructor, Instance, OperationDef, RejectRule, ResourceDef};
pub use params::{BodyType, Converter, ConverterTable, IntWidth, ParamType, Renderer};
pub use reply::{DeferredFn, DeferredJob, Reply};
