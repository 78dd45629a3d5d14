//! # Router Module
//!
//! The handler registry: an ordered list of [`RequestHandler`](crate::handler::RequestHandler)s,
//! each carrying a compiled path pattern. [`Router::match_request`] returns
//! the **first** registered handler whose method constraint and pattern both
//! accept the request. There is no specificity ranking; registration order
//! alone decides ties.
//!
//! ## Example
//!
//! ```rust
//! use brrtdispatch::handler::{HandlerOptions, RequestHandler};
//! use brrtdispatch::response::Response;
//! use brrtdispatch::router::Router;
//! use http::Method;
//! use std::sync::Arc;
//!
//! let router = Router::new();
//! let user = RequestHandler::new("user/<username>", |_req| Ok(Response::text("user")), HandlerOptions::new()).unwrap();
//! router.add(Arc::new(user));
//!
//! let m = router.match_request(&Method::GET, "/user/alice").unwrap();
//! assert_eq!(m.capture("username"), Some("alice"));
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use core::{RouteMatch, Router};
