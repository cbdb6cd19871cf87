//! sqlmemo: SQLite operations and an insights memo for AI agent orchestrators.
//!
//! An external orchestrator drives a fixed catalog of six operations over
//! newline-delimited JSON-RPC on stdin/stdout:
//!
//! | operation        | arguments            | result                        |
//! |------------------|----------------------|-------------------------------|
//! | `read_query`     | `query` (SELECT)     | JSON array of rows            |
//! | `write_query`    | `query`              | `{"affected_rows": n}`        |
//! | `create_table`   | `query` (CREATE TABLE) | "Table created successfully" |
//! | `list_tables`    | none                 | JSON array of table names     |
//! | `describe_table` | `table_name`         | JSON array of column info     |
//! | `append_insight` | `insight`            | "Insight added successfully"  |
//!
//! The memo is readable as the resource `memo://insights`. A separate HTTP
//! surface fans arbitrary JSON messages out to Server-Sent Events listeners.
//!
//! # Examples
//!
//! ```bash
//! # Serve on stdio with a file-backed store and the push channel enabled
//! sqlmemo serve --db-path shop.db --http-addr 127.0.0.1:3001
//!
//! # One-shot call
//! sqlmemo call --db-path shop.db --op list_tables
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: database handle, catalog, dispatcher, memo, broadcast hub,
//!   protocol and transports

pub mod core;
mod cli;

use crate::core::config::{self, Config, ConfigOverrides};
use crate::core::db::Database;
use crate::core::dispatch::Dispatcher;
use crate::core::insights::{self, InsightsLog};
use crate::core::{catalog, prompts, server, telemetry};
use anyhow::Context;
use clap::Parser;
use cli::{CallCli, CallRequest, CapabilitiesCli, Cli, Command, StoreArgs};
use serde_json::{Value, json};
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

pub fn default_request_id() -> String {
    ulid::Ulid::new().to_string()
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Serve(serve) => {
            config.apply_overrides(store_overrides(&serve.store, serve.http_addr));
            telemetry::init(&config.log).context("initialising logging")?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building async runtime")?;
            let outcome = runtime.block_on(server::run(config));
            // A pending stdin read would otherwise hold the runtime open.
            runtime.shutdown_timeout(Duration::from_millis(250));
            outcome?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Call(call) => {
            config.apply_overrides(store_overrides(&call.store, None));
            telemetry::init(&config.log).context("initialising logging")?;
            run_call(&config, call)
        }
        Command::Capabilities(caps) => {
            run_capabilities(&caps);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn store_overrides(store: &StoreArgs, http_addr: Option<std::net::SocketAddr>) -> ConfigOverrides {
    ConfigOverrides {
        db_path: store.db_path.clone(),
        http_addr,
        log_filter: store.log.clone(),
    }
}

fn read_call_request(call: &CallCli) -> anyhow::Result<CallRequest> {
    if call.stdin {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading request from stdin")?;
        return serde_json::from_str(&raw).context("parsing request from stdin");
    }
    let op = call
        .op
        .clone()
        .context("--op is required unless --stdin is given")?;
    let params = match &call.params {
        Some(raw) => serde_json::from_str(raw).context("parsing --params as JSON")?,
        None => Value::Null,
    };
    Ok(CallRequest {
        op,
        params,
        id: default_request_id(),
    })
}

fn run_call(config: &Config, call: CallCli) -> anyhow::Result<ExitCode> {
    let request = read_call_request(&call)?;
    let db = Database::open(&config.database.path, config.busy_timeout())
        .with_context(|| format!("opening database {}", config.database.path))?;
    let dispatcher = Dispatcher::new(Arc::new(db), Arc::new(InsightsLog::new()));

    let (envelope, code) = match dispatcher.dispatch(&request.op, Some(&request.params)) {
        Ok(result) => (
            json!({ "id": request.id, "op": request.op, "success": true, "result": result }),
            ExitCode::SUCCESS,
        ),
        Err(err) => (
            json!({
                "id": request.id,
                "op": request.op,
                "success": false,
                "error": { "code": err.kind(), "message": err.to_string() },
            }),
            ExitCode::FAILURE,
        ),
    };
    dispatcher.database().close()?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(code)
}

fn capabilities_report() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "operations": catalog::CATALOG.iter().map(|op| json!({
            "name": op.name,
            "description": op.description,
            "policy": op.policy,
            "inputSchema": op.input_schema(),
        })).collect::<Vec<_>>(),
        "resources": [insights::insights_resource()],
        "prompts": prompts::list_prompts(),
        "env": [config::ENV_DB_PATH, config::ENV_HTTP_ADDR, config::ENV_LOG, config::ENV_LOG_FORMAT],
    })
}

fn run_capabilities(caps: &CapabilitiesCli) {
    if caps.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&capabilities_report()).unwrap_or_default()
        );
        return;
    }

    use colored::Colorize;
    println!(
        "{} {}",
        env!("CARGO_PKG_NAME").bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!();
    println!("{}", "Operations".bold());
    for op in catalog::CATALOG {
        let args: Vec<&str> = op.fields.iter().map(|f| f.name).collect();
        println!(
            "  {:<16} {:<16} {}",
            op.name.bright_green(),
            op.policy.as_str().yellow(),
            if args.is_empty() {
                "(no arguments)".to_string()
            } else {
                args.join(", ")
            }
        );
    }
    println!();
    println!("{}", "Resources".bold());
    let memo = insights::insights_resource();
    println!("  {:<16} {}", memo.uri.bright_green(), memo.name);
    println!();
    println!("{}", "Prompts".bold());
    for prompt in prompts::list_prompts() {
        let args: Vec<&str> = prompt.arguments.iter().map(|a| a.name).collect();
        println!("  {:<16} {}", prompt.name.bright_green(), args.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_report_lists_the_whole_catalog() {
        let report = capabilities_report();
        assert_eq!(report["operations"].as_array().unwrap().len(), 6);
        assert_eq!(report["operations"][0]["policy"], "read_only");
        assert_eq!(report["resources"][0]["uri"], "memo://insights");
        assert_eq!(report["prompts"][0]["name"], "mcp-demo");
    }

    #[test]
    fn request_ids_are_ulids() {
        assert!(ulid::Ulid::from_string(&default_request_id()).is_ok());
    }
}
