//! # Router Module
//!
//! Path matching and route resolution.
//!
//! ## Overview
//!
//! - [`RoutePattern`] compiles a route template such as `/widgets/{id}` into an
//!   anchored regex with one typed conversion per placeholder
//! - [`Router`] registers resources in bulk, matches requests to a
//!   [`MethodEntry`] and resolves its arguments, and builds paths back from an
//!   operation name and arguments
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchyard::router::{Router, RouteMatch};
//!
//! let router = Router::default();
//! router.register(vec![widgets_resource()]);
//!
//! match router.match_request(&request, &services, &JsonContent) {
//!     RouteMatch::Found(matched) => println!("{:?}", matched.path_params),
//!     RouteMatch::MethodNotAllowed { allowed } => println!("allow: {allowed:?}"),
//!     RouteMatch::NotFound => println!("404"),
//! }
//! ```

mod core;
mod pattern;

pub use self::core::{
    MatchedRoute, MethodEntry, ParamVec, RegistrationOutcome, RouteMatch, Router,
    MAX_INLINE_PARAMS,
};
pub use self::pattern::{Captures, Conversion, Placeholder, RoutePattern};
