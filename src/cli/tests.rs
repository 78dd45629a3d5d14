//! Unit tests for CLI commands

use crate::cli::{register_demo_handlers, Cli, Commands};
use crate::config::ServerConfig;
use crate::server::Server;
use clap::Parser;
use http::Method;

#[test]
fn test_serve_command_with_overrides() {
    let cli = Cli::try_parse_from([
        "brrtdispatch",
        "serve",
        "--bind",
        "127.0.0.1:3000",
        "--workers",
        "4",
        "--debug",
    ])
    .unwrap();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            workers,
            debug,
        } => {
            assert!(config.is_none());
            assert_eq!(bind.as_deref(), Some("127.0.0.1:3000"));
            assert_eq!(workers, Some(4));
            assert!(debug);
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_match_command_parses() {
    let cli = Cli::try_parse_from([
        "brrtdispatch",
        "match",
        "--pattern",
        "news/[page=0]",
        "--path",
        "/news",
    ])
    .unwrap();

    match cli.command {
        Commands::Match { pattern, path } => {
            assert_eq!(pattern, "news/[page=0]");
            assert_eq!(path, "/news");
        }
        _ => panic!("Expected Match command"),
    }
}

#[test]
fn test_match_requires_pattern() {
    assert!(Cli::try_parse_from(["brrtdispatch", "match", "--path", "/x"]).is_err());
}

#[test]
fn test_unknown_command_fails() {
    assert!(Cli::try_parse_from(["brrtdispatch", "generate"]).is_err());
}

#[test]
fn test_demo_handlers_register_and_route() {
    let server = Server::new(ServerConfig::default());
    register_demo_handlers(&server).unwrap();

    let router = server.router();
    assert_eq!(router.len(), 5);

    let matched = router.match_request(&Method::GET, "/hello").unwrap();
    assert_eq!(matched.handler.name(), "hello");
    assert_eq!(matched.capture("name"), Some("world"));

    let matched = router
        .match_request(&Method::GET, "/user/alice/posts")
        .unwrap();
    assert_eq!(matched.handler.name(), "user_posts");
    assert_eq!(matched.capture("page"), Some("1"));

    assert!(router.match_request(&Method::POST, "/health").is_none());
}
