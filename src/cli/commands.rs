use crate::config::ServerConfig;
use crate::error::RegistrationError;
use crate::handler::HandlerOptions;
use crate::middleware::{Flow, Middleware, TracingMiddleware};
use crate::pattern::CompiledPattern;
use crate::request::IncomingRequest;
use crate::response::Response;
use crate::server::{Server, ServerHandle};
use anyhow::Context;
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How often the main thread checks for a shutdown signal
const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Command-line interface for brrtdispatch
#[derive(Parser)]
#[command(name = "brrtdispatch")]
#[command(about = "Thread-pooled HTTP dispatch core", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the server with the built-in demo handlers
    Serve {
        /// YAML configuration file (defaults plus BRRTD_* variables when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the plain listener address
        #[arg(long)]
        bind: Option<String>,

        /// Override the worker pool size
        #[arg(long)]
        workers: Option<usize>,

        /// Enable debug mode (detailed error bodies, debug middleware)
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
    /// Match a path against a pattern and print the captures
    Match {
        /// Path template, e.g. `user/<username>/posts/[page=1]`
        #[arg(short, long)]
        pattern: String,

        /// Candidate path, e.g. `/user/alice/posts`
        #[arg(long)]
        path: String,
    },
    /// Print the effective configuration as YAML
    Config {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Execute a parsed command
///
/// # Errors
///
/// Configuration, registration, startup or signal-setup failures.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            bind,
            workers,
            debug,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.debug |= debug;
            serve(config)
        }
        Commands::Match { pattern, path } => {
            let compiled = CompiledPattern::compile(&pattern)
                .with_context(|| format!("invalid pattern '{pattern}'"))?;
            let output = match compiled.matches(&path) {
                Some(captures) => json!({ "matched": true, "captures": captures.to_map() }),
                None => json!({ "matched": false }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Commands::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
    let config = match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::from_env().context("invalid BRRTD_* environment")?,
    };
    Ok(config)
}

fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = Server::new(config);
    register_demo_handlers(&server)?;
    server.router().dump();

    let shutdown = Arc::new(AtomicBool::new(false));
    register_signals(&shutdown)?;

    let handle = server.start().context("failed to start server")?;
    wait_for_signal(&handle, &shutdown);

    let report = handle.shutdown();
    info!(
        joined = report.joined,
        abandoned = report.abandoned,
        dropped_jobs = report.dropped_jobs,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(unix)]
fn register_signals(flag: &Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(flag))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn register_signals(_flag: &Arc<AtomicBool>) -> anyhow::Result<()> {
    Ok(())
}

fn wait_for_signal(handle: &ServerHandle, shutdown: &AtomicBool) {
    info!(addr = %handle.local_addr(), "Waiting for SIGINT or SIGTERM");
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(SIGNAL_POLL);
    }
    info!("Shutdown signal received");
}

/// Internal redirect to a fixed path
struct RewriteTo(&'static str);

impl Middleware for RewriteTo {
    fn handle(&self, _req: &mut IncomingRequest) -> Flow {
        Flow::Redirect(self.0.to_string())
    }

    fn name(&self) -> &str {
        "rewrite"
    }
}

/// Handlers served by `brrtdispatch serve`
///
/// # Errors
///
/// Only if one of the built-in patterns fails to compile.
pub fn register_demo_handlers(server: &Server) -> Result<(), RegistrationError> {
    let tracing_mw: Arc<dyn Middleware> = Arc::new(TracingMiddleware);

    server.register(
        "",
        |_req| Ok(Response::text("brrtdispatch\n")),
        HandlerOptions::new().name("index").cacheable(true),
    )?;

    server.register(
        "health",
        |_req| Ok(Response::json(&json!({ "status": "ok" }))),
        HandlerOptions::new().name("health").method(Method::GET),
    )?;

    server.register(
        "hello/[name=world]",
        |req| {
            let name = req.capture("name").unwrap_or("world");
            Ok(Response::text(format!("hello {name}\n")))
        },
        HandlerOptions::new()
            .name("hello")
            .middleware(Arc::clone(&tracing_mw))
            .alternate_outcome("debug", |req| {
                Ok(Response::json(&json!({
                    "handler": "hello",
                    "captures": req.captures().to_map(),
                    "request_id": req.request_id().to_string(),
                })))
            }),
    )?;

    server.register(
        "user/<username>/posts/[page=1]",
        |req| {
            Ok(Response::json(&json!({
                "user": req.capture("username"),
                "page": req.capture("page"),
            })))
        },
        HandlerOptions::new()
            .name("user_posts")
            .method(Method::GET)
            .middleware(tracing_mw),
    )?;

    server.register(
        "greeting",
        |_req| Ok(Response::text("unreachable\n")),
        HandlerOptions::new()
            .name("greeting")
            .middleware(Arc::new(RewriteTo("/hello/friend"))),
    )?;

    Ok(())
}
