//! # brrtdispatch
//!
//! **brrtdispatch** is a thread-pooled HTTP dispatch core: it accepts
//! connections, compiles them into requests, resolves each request against an
//! ordered registry of path patterns, drains a per-request middleware chain
//! and produces (or replays a cached) response.
//!
//! ## Architecture
//!
//! - **[`pattern`]** - Path template compiler and positional matcher
//!   (`<required>`, `[optional]`, `[optional=default]`)
//! - **[`router`]** - Ordered, first-match-wins handler registry with lock-free reads
//! - **[`handler`]** - Registered handlers: pattern, generation logic, capabilities,
//!   cache predicate, alternate outcomes and middleware list
//! - **[`middleware`]** - Continue / redirect / stop middleware chain
//! - **[`cache`]** - Whole-handler response snapshots over a pluggable store
//! - **[`dispatcher`]** - Route → chain → cache-or-generate for one request
//! - **[`server`]** - Accept loops, connection filters, worker pool hand-off,
//!   keep-alive connection loop, TLS
//! - **[`worker_pool`]** - Fixed-size OS thread pool with queueing backpressure
//! - **[`compiler`]**, **[`session`]**, **[`filter`]** - Collaborators the core
//!   consumes through traits, each with a default implementation
//! - **[`config`]**, **[`logging`]**, **[`cli`]** - Process edges
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Acceptor as Accept loop
//!     participant Filters as Connection filters
//!     participant Pool as WorkerPool
//!     participant Worker
//!     participant Router
//!     participant Chain as MiddlewareChain
//!     participant Cache as CacheStore
//!     participant Handler
//!
//!     Client->>Acceptor: TCP connect
//!     Acceptor->>Filters: accept(conn)?
//!     alt Rejected
//!         Filters-->>Client: connection closed
//!     end
//!     Acceptor->>Pool: submit(connection)
//!     Pool->>Worker: run on free thread
//!     Worker->>Worker: compile request, attach session
//!     Worker->>Router: match_request(method, path)
//!     alt No match
//!         Router-->>Client: 404 Not Found
//!     end
//!     Worker->>Chain: run(request)
//!     alt Redirect(path)
//!         Chain-->>Worker: re-route without a round-trip
//!     else Stop
//!         Chain-->>Client: middleware response (or close)
//!     end
//!     Worker->>Cache: get(handler id)
//!     alt Hit
//!         Cache-->>Worker: snapshot replay
//!     else Miss
//!         Worker->>Handler: generate(request)
//!         Handler-->>Worker: Response
//!         Worker->>Cache: put(handler id, snapshot)
//!     end
//!     Worker-->>Client: HTTP/1.1 response (keep-alive or close)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use brrtdispatch::config::ServerConfig;
//! use brrtdispatch::handler::HandlerOptions;
//! use brrtdispatch::response::Response;
//! use brrtdispatch::server::Server;
//!
//! let server = Server::new(ServerConfig::default());
//! server
//!     .register(
//!         "news/[page=0]",
//!         |req| Ok(Response::text(format!("page {}", req.capture("page").unwrap_or("0")))),
//!         HandlerOptions::new().name("news"),
//!     )
//!     .unwrap();
//! let handle = server.start().unwrap();
//! // ...
//! handle.shutdown();
//! ```
//!
//! ## Concurrency Model
//!
//! - One accept thread per listening protocol, independent of the workers
//! - A fixed pool of worker threads; a saturated pool queues connections
//! - Requests on one connection are strictly sequential
//! - The router and cache store are shared by all workers; requests and
//!   middleware chains never are

pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod pattern;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod worker_pool;

pub use error::{ConfigError, HandlerError, ParseError, PatternError, RegistrationError, ServerError};
pub use handler::{Capabilities, HandlerOptions, RequestHandler};
pub use middleware::{Flow, Middleware};
pub use pattern::{Captures, CompiledPattern};
pub use request::IncomingRequest;
pub use response::Response;
pub use router::Router;
pub use server::{Server, ServerHandle};
