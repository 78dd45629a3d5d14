//! Error types shared across the dispatch core.
//!
//! Per-request failures ([`ParseError`], [`HandlerError`]) are converted into
//! HTTP responses by the worker and never escape a connection. Startup
//! failures ([`ServerError`]) are fatal to [`Server::start`](crate::server::Server::start).

use http::StatusCode;
use std::fmt;
use std::io;

/// Path template compile failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// A `<` or `[` was opened but never closed within the segment
    Unterminated {
        /// The offending segment
        segment: String,
    },
    /// `<>` or `[]` (or `[=default]`) with no variable name
    EmptyName {
        /// The offending segment
        segment: String,
    },
    /// Variable names are limited to ASCII alphanumerics, `_` and `-`
    InvalidName {
        /// The rejected name
        name: String,
    },
    /// The same variable appears twice in one template
    DuplicateName {
        /// The repeated name
        name: String,
    },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Unterminated { segment } => {
                write!(f, "unterminated variable in segment '{segment}'")
            }
            PatternError::EmptyName { segment } => {
                write!(f, "variable without a name in segment '{segment}'")
            }
            PatternError::InvalidName { name } => write!(
                f,
                "invalid variable name '{name}': expected ASCII letters, digits, '_' or '-'"
            ),
            PatternError::DuplicateName { name } => {
                write!(f, "variable '{name}' is declared more than once")
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// Failure while registering or configuring a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The path template did not compile
    Pattern(PatternError),
    /// Middleware can only be appended before the handler has served a request
    AlreadyDispatched {
        /// Name of the handler that was already live
        handler: String,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::Pattern(e) => write!(f, "invalid pattern: {e}"),
            RegistrationError::AlreadyDispatched { handler } => write!(
                f,
                "handler '{handler}' has already dispatched requests; its middleware list is frozen"
            ),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Pattern(e) => Some(e),
            RegistrationError::AlreadyDispatched { .. } => None,
        }
    }
}

impl From<PatternError> for RegistrationError {
    fn from(e: PatternError) -> Self {
        RegistrationError::Pattern(e)
    }
}

/// Request compiler failure
#[derive(Debug)]
pub enum ParseError {
    /// Request line or headers are not valid HTTP/1.x
    Malformed(String),
    /// Header section exceeded the configured limit
    HeadersTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },
    /// Declared body exceeded the configured limit
    BodyTooLarge {
        /// Declared `Content-Length`
        declared: usize,
        /// Configured limit in bytes
        limit: usize,
    },
    /// Framing we do not speak (e.g. chunked request bodies)
    Unsupported(String),
    /// The peer went away or timed out mid-request
    Io(io::Error),
}

impl ParseError {
    /// Status code of the protocol-error response sent for this failure
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::HeadersTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ParseError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            ParseError::Malformed(_) | ParseError::Io(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed(msg) => write!(f, "malformed request: {msg}"),
            ParseError::HeadersTooLarge { limit } => {
                write!(f, "request headers exceed {limit} bytes")
            }
            ParseError::BodyTooLarge { declared, limit } => {
                write!(f, "request body of {declared} bytes exceeds {limit} bytes")
            }
            ParseError::Unsupported(what) => write!(f, "unsupported request framing: {what}"),
            ParseError::Io(e) => write!(f, "i/o error while reading request: {e}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

/// Error returned by response-generation logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
    status: StatusCode,
}

impl HandlerError {
    /// Generic failure; rendered as `500 Internal Server Error`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failure with an explicit status (e.g. `400` for bad input)
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for HandlerError {}

/// Invalid configuration file or environment override
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read
    Read {
        /// Path that failed
        path: String,
        /// Underlying error
        source: io::Error,
    },
    /// The config file is not valid YAML for [`ServerConfig`](crate::config::ServerConfig)
    Parse(serde_yaml::Error),
    /// An environment variable held a value of the wrong shape
    InvalidEnv {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
    /// The resulting configuration is internally inconsistent
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config file '{path}': {source}")
            }
            ConfigError::Parse(e) => write!(f, "failed to parse config: {e}"),
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "invalid value '{value}' for environment variable {key}")
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Fatal acceptor startup failure
#[derive(Debug)]
pub enum ServerError {
    /// A listening socket could not be bound
    Bind {
        /// Address we tried to bind
        addr: String,
        /// Underlying error
        source: io::Error,
    },
    /// Certificate or key material could not be loaded
    Tls(String),
    /// A worker or accept thread could not be spawned
    Spawn(io::Error),
    /// The configuration handed to the server is unusable
    Config(ConfigError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            ServerError::Tls(msg) => write!(f, "TLS setup failed: {msg}"),
            ServerError::Spawn(e) => write!(f, "failed to spawn thread: {e}"),
            ServerError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        ServerError::Config(e)
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Spawn(e) => Some(e),
            ServerError::Config(e) => Some(e),
            ServerError::Tls(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_status_mapping() {
        assert_eq!(
            ParseError::Malformed("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ParseError::BodyTooLarge {
                declared: 10,
                limit: 1
            }
            .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ParseError::HeadersTooLarge { limit: 1 }.status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
    }

    #[test]
    fn test_handler_error_defaults_to_500() {
        let e = HandlerError::new("boom");
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message(), "boom");
    }

    #[test]
    fn test_registration_error_wraps_pattern_error() {
        let e: RegistrationError = PatternError::EmptyName {
            segment: "<>".into(),
        }
        .into();
        assert!(e.to_string().contains("invalid pattern"));
    }
}
