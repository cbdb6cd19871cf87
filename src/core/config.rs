//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML file,
//! `SQLMEMO_*` environment variables, command-line flags.

use crate::core::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::core::error::SqlMemoError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "SQLMEMO_DB_PATH";
pub const ENV_HTTP_ADDR: &str = "SQLMEMO_HTTP_ADDR";
pub const ENV_LOG: &str = "SQLMEMO_LOG";
pub const ENV_LOG_FORMAT: &str = "SQLMEMO_LOG_FORMAT";

pub const DEFAULT_DB_PATH: &str = "sqlmemo.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = SqlMemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(SqlMemoError::ConfigError(format!(
                "unknown log format '{other}' (expected 'compact' or 'json')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// File path, or `:memory:` for a volatile store.
    pub path: String,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Address for the push/ingestion HTTP surface. Disabled when unset.
    pub http_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub broadcast: BroadcastConfig,
    pub log: LogConfig,
}

/// Values supplied on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<String>,
    pub http_addr: Option<SocketAddr>,
    pub log_filter: Option<String>,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, SqlMemoError> {
        toml::from_str(raw).map_err(|e| SqlMemoError::ConfigError(e.to_string()))
    }

    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, SqlMemoError> {
        let mut config = match file {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    SqlMemoError::ConfigError(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `SQLMEMO_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SqlMemoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.database.path = path;
        }
        if let Some(addr) = lookup(ENV_HTTP_ADDR).filter(|v| !v.is_empty()) {
            self.broadcast.http_addr = Some(parse_addr(&addr)?);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log.filter = filter;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.is_empty()) {
            self.log.format = format.parse()?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.db_path {
            self.database.path = path;
        }
        if let Some(addr) = overrides.http_addr {
            self.broadcast.http_addr = Some(addr);
        }
        if let Some(filter) = overrides.log_filter {
            self.log.filter = filter;
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }
}

pub fn parse_addr(raw: &str) -> Result<SocketAddr, SqlMemoError> {
    raw.trim()
        .parse()
        .map_err(|e| SqlMemoError::ConfigError(format!("invalid socket address '{raw}': {e}")))
}
