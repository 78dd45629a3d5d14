//! # Dispatcher Module
//!
//! The per-request half of the worker: given a parsed [`IncomingRequest`](crate::request::IncomingRequest),
//! resolve it against the [`Router`](crate::router::Router), drain the matched
//! handler's middleware chain and produce a response.
//!
//! ## Request Flow
//!
//! 1. Router resolves the path to the first matching handler (none → `404`)
//! 2. Captures and the handler are attached to the request
//! 3. `force_https` handlers reached over plain HTTP answer `301` to the HTTPS URL
//! 4. A fresh middleware chain runs:
//!    - finished → generation
//!    - redirected → back to step 1 with the new path (at most
//!      [`MAX_INTERNAL_REDIRECTS`] times)
//!    - halted → the middleware's own response, or nothing at all
//! 5. Generation: a selected alternate outcome runs directly; otherwise a
//!    cache-eligible, applicable handler replays its snapshot or generates
//!    and stores one
//!
//! ## Error Handling
//!
//! - Handler errors become responses with the error's status
//! - Panics in middleware or generation are caught and become `500`
//! - Error bodies are generic unless debug mode is on

mod core;

pub use core::{DispatchOutcome, DispatchSettings, Dispatcher, MAX_INTERNAL_REDIRECTS};
