//! # Dispatcher Module
//!
//! Turns a matched route into a reply.
//!
//! - [`Invoker`] constructs the handler, validates arguments, calls the
//!   operation and validates its reply. Every failure becomes an
//!   [`HttpFailure`](crate::error::HttpFailure) value; panics are caught.
//! - [`Dispatcher`] is the entry point for the host's server: it matches the
//!   request, hands the match to the [`AsyncBridge`](crate::bridge::AsyncBridge)
//!   and renders the outcome.
//!
//! ## Request Flow
//!
//! 1. Router matches the request and resolves arguments
//! 2. The bridge answers status polls, submits asynchronous work or calls the invoker
//! 3. The outcome is rendered into a [`Response`](crate::response::Response)

mod core;
mod invoker;

pub use self::core::Dispatcher;
pub use self::invoker::Invoker;
pub(crate) use self::invoker::panic_message;
