//! Node Configuration
//!
//! The handful of values the storage node consumes at startup. Parsing them
//! from the command line happens in `main.rs`; this module only holds the
//! values, their defaults, and validation.

use std::net::ToSocketAddrs;
use std::time::Duration;
use thiserror::Error;

/// Default port a node listens on.
pub const DEFAULT_PORT: u16 = 7070;

/// Default host a node binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default number of concurrent sessions.
pub const DEFAULT_WORKERS: usize = 16;

/// Default lifetime of an entry when a command carries no TTL override.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default time a session may sit idle before it is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between two reaper sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long the accept loop waits for a free worker before rejecting.
pub const ADMISSION_WAIT: Duration = Duration::from_secs(1);

/// Errors produced by [`NodeConfig::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker pool capacity must be at least 1")]
    NoWorkers,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}

/// Configuration of a single storage node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Worker pool capacity (maximum concurrent sessions)
    pub workers: usize,
    /// TTL applied when a command's override is zero
    pub default_ttl: Duration,
    /// Session idle timeout, reset before every command
    pub idle_timeout: Duration,
    /// Pause between reaper sweeps
    pub sweep_interval: Duration,
    /// Stop accepting after this many connections (None = accept forever)
    pub accept_limit: Option<usize>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            default_ttl: DEFAULT_TTL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            accept_limit: None,
        }
    }
}

impl NodeConfig {
    /// Returns the bind address as a string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks that every value can actually drive a node.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.default_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("default TTL"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("idle timeout"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("sweep interval"));
        }
        // Hostnames are accepted when they resolve, same as the bind itself
        let addr = self.bind_address();
        let resolves = addr
            .to_socket_addrs()
            .is_ok_and(|mut addrs| addrs.next().is_some());
        if !resolves {
            return Err(ConfigError::InvalidAddress(addr));
        }
        Ok(())
    }
}
