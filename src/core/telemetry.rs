//! Logging to stderr. Stdout carries protocol traffic only.

use crate::core::config::{LogConfig, LogFormat};
use crate::core::error::SqlMemoError;
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

pub fn init(config: &LogConfig) -> Result<(), SqlMemoError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        SqlMemoError::ConfigError(format!("invalid log filter {:?}: {e}", config.filter))
    })?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    // A subscriber installed earlier in the process stays in place.
    let _ = match config.format {
        LogFormat::Json => fmt.json().flatten_event(true).try_init(),
        LogFormat::Compact => fmt.compact().try_init(),
    };
    Ok(())
}
