//! # Server Configuration
//!
//! [`ServerConfig`] is the single value the server core is built from. It is
//! loaded from an optional YAML file and then overridden by `BRRTD_*`
//! environment variables; every field has a default so an empty file (or no
//! file at all) yields a working configuration.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `BRRTD_BIND` | `bind` |
//! | `BRRTD_TLS_BIND`, `BRRTD_TLS_CERT`, `BRRTD_TLS_KEY` | `tls` (all three required together) |
//! | `BRRTD_WORKERS` | `workers` |
//! | `BRRTD_STACK_SIZE` | `worker_stack_size` (decimal or `0x` hex) |
//! | `BRRTD_SHUTDOWN_GRACE_MS` | `shutdown_grace_ms` |
//! | `BRRTD_DEBUG` | `debug` |
//! | `BRRTD_CACHE_ENABLED` | `cache_enabled` |
//! | `BRRTD_KEEP_ALIVE` | `keep_alive` |
//! | `BRRTD_KEEP_ALIVE_TIMEOUT_MS` | `keep_alive_timeout_ms` |
//! | `BRRTD_MAX_REQUESTS_PER_CONNECTION` | `max_requests_per_connection` |
//! | `BRRTD_MAX_BODY_BYTES` | `max_body_bytes` |
//! | `BRRTD_SESSION_TTL_MS` | `session_ttl_ms` |
//! | `BRRTD_THROTTLE_LIMIT` | `throttle.limit` |
//!
//! A variable that is set but cannot be parsed is a [`ConfigError`]; it is
//! never silently ignored.
//!
//! ## Example
//!
//! ```yaml
//! bind: "127.0.0.1:8080"
//! workers: 16
//! debug: true
//! tls:
//!   bind: "127.0.0.1:8443"
//!   cert_path: "certs/server.pem"
//!   key_path: "certs/server.key"
//! throttle:
//!   limit: 100
//!   window_ms: 1000
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// TLS listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Address of the TLS listener
    pub bind: String,
    /// PEM certificate chain
    pub cert_path: PathBuf,
    /// PEM private key
    pub key_path: PathBuf,
}

/// Per-peer connection throttle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Connections allowed per peer IP within one window; `0` disables
    pub limit: u32,
    pub window_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            window_ms: 60_000,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Process configuration for a dispatch server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address of the plain HTTP listener
    pub bind: String,
    /// Optional TLS listener
    pub tls: Option<TlsConfig>,
    /// Worker pool size
    pub workers: usize,
    /// Stack size for worker threads in bytes (platform default when unset)
    pub worker_stack_size: Option<usize>,
    /// Grace period for in-flight connections at shutdown
    pub shutdown_grace_ms: u64,
    /// Detailed error bodies and the debug middleware on every handler
    pub debug: bool,
    pub cache_enabled: bool,
    pub keep_alive: bool,
    /// Idle read timeout on a kept-alive connection
    pub keep_alive_timeout_ms: u64,
    pub max_requests_per_connection: usize,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    /// Name of the session cookie
    pub session_cookie: String,
    /// Idle time after which a session is forgotten
    pub session_ttl_ms: u64,
    pub throttle: ThrottleConfig,
    /// Sleep between stop-flag checks while accepting is paused
    pub pause_poll_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            tls: None,
            workers: 8,
            worker_stack_size: None,
            shutdown_grace_ms: 5_000,
            debug: false,
            cache_enabled: true,
            keep_alive: true,
            keep_alive_timeout_ms: 5_000,
            max_requests_per_connection: 100,
            max_header_bytes: 8 * 1024,
            max_body_bytes: 1024 * 1024,
            session_cookie: "session".to_string(),
            session_ttl_ms: 30 * 60 * 1000,
            throttle: ThrottleConfig::default(),
            pause_poll_ms: 10,
        }
    }
}

impl ServerConfig {
    /// Read a YAML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Unreadable file, invalid YAML, invalid override or inconsistent result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    ///
    /// # Errors
    ///
    /// Invalid override or inconsistent result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without consulting the environment
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Apply `BRRTD_*` overrides read through `lookup`
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("BRRTD_BIND") {
            self.bind = bind;
        }
        override_parsed(&lookup, "BRRTD_WORKERS", &mut self.workers)?;
        if let Some(raw) = lookup("BRRTD_STACK_SIZE") {
            self.worker_stack_size = Some(parse_size("BRRTD_STACK_SIZE", &raw)?);
        }
        override_parsed(&lookup, "BRRTD_SHUTDOWN_GRACE_MS", &mut self.shutdown_grace_ms)?;
        override_bool(&lookup, "BRRTD_DEBUG", &mut self.debug)?;
        override_bool(&lookup, "BRRTD_CACHE_ENABLED", &mut self.cache_enabled)?;
        override_bool(&lookup, "BRRTD_KEEP_ALIVE", &mut self.keep_alive)?;
        override_parsed(
            &lookup,
            "BRRTD_KEEP_ALIVE_TIMEOUT_MS",
            &mut self.keep_alive_timeout_ms,
        )?;
        override_parsed(
            &lookup,
            "BRRTD_MAX_REQUESTS_PER_CONNECTION",
            &mut self.max_requests_per_connection,
        )?;
        override_parsed(&lookup, "BRRTD_MAX_BODY_BYTES", &mut self.max_body_bytes)?;
        override_parsed(&lookup, "BRRTD_SESSION_TTL_MS", &mut self.session_ttl_ms)?;
        override_parsed(&lookup, "BRRTD_THROTTLE_LIMIT", &mut self.throttle.limit)?;

        let tls_bind = lookup("BRRTD_TLS_BIND");
        let tls_cert = lookup("BRRTD_TLS_CERT");
        let tls_key = lookup("BRRTD_TLS_KEY");
        match (tls_bind, tls_cert, tls_key) {
            (Some(bind), Some(cert), Some(key)) => {
                self.tls = Some(TlsConfig {
                    bind,
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            }
            (None, None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "BRRTD_TLS_BIND, BRRTD_TLS_CERT and BRRTD_TLS_KEY must be set together"
                        .to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("bind address is empty".into()));
        }
        if self.max_requests_per_connection == 0 {
            return Err(ConfigError::Invalid(
                "max_requests_per_connection must be at least 1".into(),
            ));
        }
        if self.max_header_bytes < 64 {
            return Err(ConfigError::Invalid(format!(
                "max_header_bytes of {} cannot hold a request line",
                self.max_header_bytes
            )));
        }
        if self.session_ttl_ms == 0 {
            return Err(ConfigError::Invalid("session_ttl_ms must be positive".into()));
        }
        if self.throttle.limit > 0 && self.throttle.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "throttle.window_ms must be positive when throttling is enabled".into(),
            ));
        }
        if let Some(tls) = &self.tls {
            if tls.bind == self.bind && !self.bind.ends_with(":0") {
                return Err(ConfigError::Invalid(format!(
                    "TLS listener cannot share the plain bind address {}",
                    self.bind
                )));
            }
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn override_bool<F>(lookup: &F, key: &str, slot: &mut bool) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    key: key.to_string(),
                    value: raw,
                })
            }
        };
    }
    Ok(())
}

/// Byte count in decimal (`32768`) or hex (`0x8000`)
fn parse_size(key: &str, raw: &str) -> Result<usize, ConfigError> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => trimmed.parse().ok(),
    };
    parsed.ok_or_else(|| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 8);
        assert_eq!(config.session_cookie, "session");
        assert_eq!(config.throttle.limit, 0);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ServerConfig::from_yaml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml("workers: 3\nthrottle:\n  limit: 5\n").unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.throttle.limit, 5);
        assert_eq!(config.throttle.window_ms, 60_000);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ServerConfig::from_yaml("wrokers: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("BRRTD_BIND", "127.0.0.1:9000"),
                ("BRRTD_WORKERS", "2"),
                ("BRRTD_DEBUG", "yes"),
                ("BRRTD_STACK_SIZE", "0x8000"),
                ("BRRTD_SESSION_TTL_MS", "60000"),
            ]))
            .unwrap();
        assert_eq!(config.session_ttl(), Duration::from_secs(60));
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.workers, 2);
        assert!(config.debug);
        assert_eq!(config.worker_stack_size, Some(0x8000));
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup(&[("BRRTD_WORKERS", "many")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidEnv { key, value } => {
                assert_eq!(key, "BRRTD_WORKERS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
        let err = config
            .apply_overrides(lookup(&[("BRRTD_KEEP_ALIVE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_partial_tls_override_is_rejected() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup(&[("BRRTD_TLS_BIND", "0.0.0.0:8443")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = ServerConfig {
            workers: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("K", "16384").unwrap(), 16384);
        assert_eq!(parse_size("K", "0x4000").unwrap(), 0x4000);
        assert!(parse_size("K", "0xZZ").is_err());
    }
}
