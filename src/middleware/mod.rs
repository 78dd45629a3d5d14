//! # Middleware Module
//!
//! Pre-dispatch request processing. Each handler declares an ordered list of
//! [`Middleware`]; for every dispatch the worker builds a fresh
//! [`MiddlewareChain`] from that list and drains it. Each step returns a
//! [`Flow`]:
//!
//! - [`Flow::Continue`] - hand the request to the next middleware
//! - [`Flow::Redirect`] - abort and re-route to another path (internal redirect)
//! - [`Flow::Stop`] - halt; the middleware produced the response itself
//!
//! Panics raised by middleware are contained by the dispatcher, not the chain.
//!
//! ## Built-in middleware
//!
//! - [`TracingMiddleware`] - one structured log line per request
//! - [`DebugMiddleware`] - verbose logging and `?debug` outcome selection

mod core;
mod debug;
mod tracing;

pub use core::{ChainOutcome, Flow, Middleware, MiddlewareChain};
pub use debug::{DebugMiddleware, DEBUG_OUTCOME};
pub use tracing::TracingMiddleware;
