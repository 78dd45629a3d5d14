//! Server core module - process-wide context, startup and shutdown.

use super::acceptor::{wake, AcceptLoop, AcceptState};
use super::connection::{ConnectionPolicy, ConnectionWorker};
use super::tls::load_server_config;
use crate::cache::{CacheStore, InMemoryCacheStore};
use crate::compiler::{Http1Compiler, RequestCompiler};
use crate::config::ServerConfig;
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::error::{HandlerError, RegistrationError, ServerError};
use crate::filter::{ActiveConnectionFilter, ConnectionFilter, ConnectionThrottle};
use crate::handler::{HandlerOptions, RequestHandler};
use crate::middleware::DebugMiddleware;
use crate::request::{IncomingRequest, Protocol};
use crate::response::Response;
use crate::router::Router;
use crate::session::{InMemorySessions, SessionProvider};
use crate::worker_pool::{PoolMetricsSnapshot, ShutdownReport, WorkerPool, WorkerPoolConfig};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ACCEPT_JOIN_POLL: Duration = Duration::from_millis(5);

/// Handler registration shared by [`Server`] and [`ServerHandle`]
#[derive(Clone)]
struct Registry {
    router: Arc<Router>,
    cache: Arc<dyn CacheStore>,
    debug: bool,
}

impl Registry {
    fn register<F>(
        &self,
        pattern: &str,
        generate: F,
        options: HandlerOptions,
    ) -> Result<Arc<RequestHandler>, RegistrationError>
    where
        F: Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        let handler = RequestHandler::new(pattern, generate, options)?;
        if self.debug {
            handler.prepend_middleware(Arc::new(DebugMiddleware));
        }
        Ok(self.router.add(Arc::new(handler)))
    }

    fn unregister(&self, handler: &RequestHandler) -> bool {
        let removed = self.router.remove(handler);
        if removed {
            self.cache.remove(&handler.id());
        }
        removed
    }
}

/// Process-wide server context
///
/// Owns the router, cache store, session provider, request compiler and
/// connection filters. Handlers are registered on it before [`Server::start`];
/// after start they can still be registered through the returned
/// [`ServerHandle`].
///
/// # Example
///
/// ```no_run
/// use brrtdispatch::config::ServerConfig;
/// use brrtdispatch::handler::HandlerOptions;
/// use brrtdispatch::response::Response;
/// use brrtdispatch::server::Server;
///
/// let server = Server::new(ServerConfig::default());
/// server
///     .register("hello/[name=world]", |req| {
///         Ok(Response::text(format!("hello {}", req.capture("name").unwrap_or(""))))
///     }, HandlerOptions::new())
///     .unwrap();
/// let handle = server.start().unwrap();
/// handle.shutdown();
/// ```
pub struct Server {
    config: ServerConfig,
    registry: Registry,
    sessions: Arc<dyn SessionProvider>,
    compiler: Arc<dyn RequestCompiler>,
    filters: Vec<Arc<dyn ConnectionFilter>>,
}

impl Server {
    /// Build a server with the default collaborators
    ///
    /// In-memory cache and sessions, the HTTP/1.x compiler and the
    /// active-connection and throttle filters.
    pub fn new(config: ServerConfig) -> Self {
        let throttle = ConnectionThrottle::new(config.throttle.limit, config.throttle.window());
        Self {
            registry: Registry {
                router: Arc::new(Router::new()),
                cache: Arc::new(InMemoryCacheStore::new()),
                debug: config.debug,
            },
            sessions: Arc::new(InMemorySessions::with_ttl(
                config.session_cookie.clone(),
                config.session_ttl(),
            )),
            compiler: Arc::new(Http1Compiler::new(
                config.max_header_bytes,
                config.max_body_bytes,
            )),
            filters: vec![Arc::new(ActiveConnectionFilter), Arc::new(throttle)],
            config,
        }
    }

    #[must_use]
    pub fn with_cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.registry.cache = cache;
        self
    }

    #[must_use]
    pub fn with_session_provider(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn with_request_compiler(mut self, compiler: Arc<dyn RequestCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Append a connection filter; filters run in insertion order after the defaults
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn ConnectionFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.registry.router
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.registry.cache
    }

    /// Compile `pattern` and append a handler running `generate`
    ///
    /// In debug mode the handler's middleware list starts with
    /// [`DebugMiddleware`].
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] if the pattern does not compile.
    pub fn register<F>(
        &self,
        pattern: &str,
        generate: F,
        options: HandlerOptions,
    ) -> Result<Arc<RequestHandler>, RegistrationError>
    where
        F: Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(pattern, generate, options)
    }

    /// Remove `handler` and evict its cached snapshot
    pub fn unregister(&self, handler: &RequestHandler) -> bool {
        self.registry.unregister(handler)
    }

    /// Bind the listeners, spawn the worker pool and start accepting
    ///
    /// # Errors
    ///
    /// Bind failures, unusable TLS material and thread spawn failures are
    /// fatal and returned before any connection is accepted.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        let config = self.config;
        config.validate()?;

        let plain = bind(&config.bind)?;
        let local_addr = local_addr_of(&plain, &config.bind)?;

        let (tls_listener, tls_addr, tls_config) = match &config.tls {
            Some(tls) => {
                let server_config = load_server_config(tls)?;
                let listener = bind(&tls.bind)?;
                let addr = local_addr_of(&listener, &tls.bind)?;
                (Some(listener), Some(addr), Some(server_config))
            }
            None => (None, None, None),
        };

        let pool = Arc::new(WorkerPool::new(WorkerPoolConfig {
            num_workers: config.workers,
            stack_size: config.worker_stack_size,
            ..WorkerPoolConfig::default()
        })?);

        let state = Arc::new(AcceptState::default());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry.router),
            Arc::clone(&self.registry.cache),
            DispatchSettings {
                cache_enabled: config.cache_enabled,
                debug: config.debug,
                tls_port: tls_addr.map(|a| a.port()),
            },
        ));
        let worker = Arc::new(ConnectionWorker {
            dispatcher,
            compiler: self.compiler,
            sessions: self.sessions,
            policy: ConnectionPolicy {
                keep_alive: config.keep_alive,
                idle_timeout: config.keep_alive_timeout(),
                max_requests: config.max_requests_per_connection,
                debug: config.debug,
            },
            stopping: Arc::clone(&state.stopping),
        });
        let filters: Arc<[Arc<dyn ConnectionFilter>]> = self.filters.into();

        let handle = ServerHandle {
            local_addr,
            tls_addr,
            state: Arc::clone(&state),
            pool: Arc::clone(&pool),
            registry: self.registry,
            accept_threads: Mutex::new(Vec::new()),
            grace: config.shutdown_grace(),
        };

        let mut listeners = vec![(plain, Protocol::Plain, None)];
        if let Some(listener) = tls_listener {
            listeners.push((listener, Protocol::Tls, tls_config));
        }
        for (listener, protocol, tls) in listeners {
            let accept = AcceptLoop {
                listener,
                protocol,
                tls,
                filters: Arc::clone(&filters),
                pool: Arc::clone(&pool),
                worker: Arc::clone(&worker),
                state: Arc::clone(&state),
                pause_poll: config.pause_poll(),
            };
            let spawned = thread::Builder::new()
                .name(format!("brrtd-accept-{protocol}"))
                .spawn(move || accept.run());
            match spawned {
                Ok(thread) => handle.accept_threads.lock().push(thread),
                Err(e) => {
                    handle.shutdown();
                    return Err(ServerError::Spawn(e));
                }
            }
        }

        info!(
            addr = %local_addr,
            tls_addr = ?tls_addr,
            workers = pool.num_workers(),
            debug = config.debug,
            cache_enabled = config.cache_enabled,
            handlers_count = handle.registry.router.len(),
            "Server started"
        );
        Ok(handle)
    }
}

fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn local_addr_of(listener: &TcpListener, addr: &str) -> Result<SocketAddr, ServerError> {
    listener.local_addr().map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Handle to a running server
///
/// Dropping the handle does not stop the server; call
/// [`ServerHandle::shutdown`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    tls_addr: Option<SocketAddr>,
    state: Arc<AcceptState>,
    pool: Arc<WorkerPool>,
    registry: Registry,
    accept_threads: Mutex<Vec<JoinHandle<()>>>,
    grace: Duration,
}

impl ServerHandle {
    /// Address of the plain listener (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tls_addr(&self) -> Option<SocketAddr> {
        self.tls_addr
    }

    /// Wait for the plain listener to accept connections
    ///
    /// # Errors
    ///
    /// `TimedOut` if the listener is not reachable within ~250ms.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect(self.local_addr) {
                drop(stream);
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting new connections; in-flight connections continue
    pub fn pause(&self) {
        if !self.state.paused.swap(true, Ordering::SeqCst) {
            info!(addr = %self.local_addr, "Accepting paused");
        }
    }

    pub fn resume(&self) {
        if self.state.paused.swap(false, Ordering::SeqCst) {
            info!(addr = %self.local_addr, "Accepting resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.state.stopping.load(Ordering::SeqCst)
    }

    pub fn pool_metrics(&self) -> PoolMetricsSnapshot {
        self.pool.metrics()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.registry.router
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.registry.cache
    }

    /// Register a handler on the running server; it takes effect for the
    /// next request that is routed
    ///
    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] if the pattern does not compile.
    pub fn register<F>(
        &self,
        pattern: &str,
        generate: F,
        options: HandlerOptions,
    ) -> Result<Arc<RequestHandler>, RegistrationError>
    where
        F: Fn(&mut IncomingRequest) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(pattern, generate, options)
    }

    /// Remove `handler` and evict its cached snapshot
    pub fn unregister(&self, handler: &RequestHandler) -> bool {
        self.registry.unregister(handler)
    }

    /// Stop accepting, close the listeners and give in-flight connections
    /// the configured grace period
    ///
    /// Calling it again is a no-op returning an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.state.stopping.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        info!(addr = %self.local_addr, grace_ms = self.grace.as_millis() as u64, "Shutting down");

        wake(self.local_addr);
        if let Some(addr) = self.tls_addr {
            wake(addr);
        }
        let threads = std::mem::take(&mut *self.accept_threads.lock());
        let detached = join_within(threads, self.grace);
        if detached > 0 {
            warn!(detached, "Accept threads still blocked after grace, detaching");
        }

        let report = self.pool.shutdown(self.grace);
        if report.is_clean() {
            info!(joined = report.joined, "Server stopped");
        } else {
            warn!(
                joined = report.joined,
                abandoned = report.abandoned,
                dropped_jobs = report.dropped_jobs,
                "Server stopped with work abandoned"
            );
        }
        report
    }
}

/// Join `threads` until `timeout`, returning how many were left running
fn join_within(mut threads: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let (finished, running): (Vec<_>, Vec<_>) =
            threads.into_iter().partition(JoinHandle::is_finished);
        for thread in finished {
            if thread.join().is_err() {
                warn!("Accept thread exited with a panic");
            }
        }
        threads = running;
        if threads.is_empty() || Instant::now() >= deadline {
            return threads.len();
        }
        thread::sleep(ACCEPT_JOIN_POLL);
    }
}
