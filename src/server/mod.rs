//! # Server Module
//!
//! The connection acceptor and per-connection worker.
//!
//! ## Architecture
//!
//! - One accept thread per listening protocol (plain, and TLS when
//!   configured) blocks in `accept`, checking a cooperative stop flag and a
//!   paused flag between accepts
//! - Accepted sockets run through the connection filters on the accept
//!   thread; a rejected socket is shut down without touching the pool
//! - Surviving sockets are queued on the fixed-size [`WorkerPool`](crate::worker_pool::WorkerPool);
//!   saturation queues rather than spawning threads
//! - A worker serves one connection at a time: compile a request, attach the
//!   session, [`Dispatcher::dispatch`](crate::dispatcher::Dispatcher::dispatch),
//!   write the response, then keep the connection or close it
//!
//! ## Shutdown
//!
//! [`ServerHandle::shutdown`] sets the stop flag, wakes and joins the accept
//! threads (closing the listeners), then gives the pool the configured grace
//! period. Workers close kept-alive connections at the next request boundary.

mod acceptor;
mod connection;
mod core;
mod tls;

pub use core::{Server, ServerHandle};
