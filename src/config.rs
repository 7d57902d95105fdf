//! Process configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags. The result is built once at startup and shared
//! read-only for the life of the process.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default listen address, all interfaces on port 8080.
pub const DEFAULT_BIND: &str = ":8080";

/// Default log level for the `viewproxy` target.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listen address. A bare `:port` binds every interface.
    pub bind: String,
    /// Upper bound on one upstream exchange. Unset means no limit.
    pub upstream_timeout_secs: Option<u64>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            upstream_timeout_secs: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address {0:?}")]
    Bind(String),
}

impl Config {
    /// Loads a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Resolves `bind` into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_bind(&self.bind)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }
}

/// Parses a listen address, accepting the `:8080` shorthand for
/// `0.0.0.0:8080`.
pub fn parse_bind(bind: &str) -> Result<SocketAddr, ConfigError> {
    let bind = bind.trim();
    let full = if bind.starts_with(':') {
        format!("0.0.0.0{}", bind)
    } else {
        bind.to_string()
    };
    full.parse().map_err(|_| ConfigError::Bind(bind.to_string()))
}
