//! # CLI Module
//!
//! Command-line interface for the `brrtdispatch` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start the server with a small set of demo handlers and run until SIGINT
//! or SIGTERM:
//!
//! ```bash
//! brrtdispatch serve --config config.yaml
//! brrtdispatch serve --bind 127.0.0.1:3000 --workers 4 --debug
//! ```
//!
//! ### `match`
//!
//! Try a path template against a path without starting anything:
//!
//! ```bash
//! brrtdispatch match --pattern 'user/<username>/posts/[page]' --path /user/alice/posts/3
//! ```
//!
//! ### `config`
//!
//! Print the effective configuration (file plus `BRRTD_*` overrides):
//!
//! ```bash
//! BRRTD_WORKERS=16 brrtdispatch config
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{register_demo_handlers, run_cli, Cli, Commands};
