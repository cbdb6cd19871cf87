//! CLI struct definitions for the sqlmemo command-line interface.
//!
//! All clap-derived types live here. Command handling lives in `lib.rs`.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "sqlmemo",
    version = env!("CARGO_PKG_VERSION"),
    about = "SQLite operations and a business-insights memo for agent orchestrators, served over JSON-RPC on stdio with an optional broadcast push channel."
)]
pub(crate) struct Cli {
    /// TOML configuration file.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct StoreArgs {
    /// SQLite database file, or `:memory:` for a volatile store.
    #[clap(long)]
    pub db_path: Option<String>,
    /// Log filter directive (e.g. `info`, `sqlmemo=debug`).
    #[clap(long)]
    pub log: Option<String>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ServeCli {
    #[clap(flatten)]
    pub store: StoreArgs,
    /// Address for the broadcast HTTP endpoint (e.g. 127.0.0.1:3001).
    #[clap(long)]
    pub http_addr: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CallCli {
    #[clap(flatten)]
    pub store: StoreArgs,
    /// Operation to perform
    #[clap(long)]
    pub op: Option<String>,
    /// JSON arguments
    #[clap(long)]
    pub params: Option<String>,
    /// Read `{"op": ..., "params": ...}` from stdin instead of flags
    #[clap(long)]
    pub stdin: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CapabilitiesCli {
    /// Output format: 'json' or 'text'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Serve JSON-RPC on stdin/stdout (and the broadcast endpoint if configured)
    Serve(ServeCli),
    /// Run one operation and print its result envelope
    Call(CallCli),
    /// List operations, resources and prompts
    Capabilities(CapabilitiesCli),
}

/// Request shape accepted by `call --stdin`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct CallRequest {
    pub op: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default = "crate::default_request_id")]
    pub id: String,
}
