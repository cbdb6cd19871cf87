//! Process wiring for `serve`: the stdio protocol loop, the optional
//! broadcast endpoint, and orderly shutdown.

use crate::core::broadcast::BroadcastHub;
use crate::core::config::Config;
use crate::core::db::Database;
use crate::core::dispatch::Dispatcher;
use crate::core::error::SqlMemoError;
use crate::core::http;
use crate::core::insights::InsightsLog;
use crate::core::rpc::{Outbound, RpcSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared resources owned for the lifetime of the process.
pub struct AppContext {
    pub db: Arc<Database>,
    pub insights: Arc<InsightsLog>,
    pub hub: BroadcastHub,
}

impl AppContext {
    pub fn open(config: &Config) -> Result<Self, SqlMemoError> {
        let db = Database::open(&config.database.path, config.busy_timeout())?;
        Ok(Self::with_database(db))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            insights: Arc::new(InsightsLog::new()),
            hub: BroadcastHub::new(),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.db), Arc::clone(&self.insights))
    }
}

/// Reads requests line by line from `input` and writes replies to `output`
/// until EOF. Requests are handled one at a time, in arrival order.
///
/// A line that is not valid UTF-8 or not valid JSON is answered with a parse
/// error and the loop carries on.
pub async fn serve_stream<R, W>(
    session: Arc<RpcSession>,
    mut input: R,
    mut output: W,
) -> Result<(), SqlMemoError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let raw = line.to_vec();
        let handler = Arc::clone(&session);
        let replies = tokio::task::spawn_blocking(move || handler.handle_bytes(&raw))
            .await
            .map_err(|e| SqlMemoError::ValidationError(format!("request task failed: {e}")))?;
        write_replies(&mut output, &replies).await?;
    }
}

async fn write_replies<W>(output: &mut W, replies: &[Outbound]) -> Result<(), SqlMemoError>
where
    W: AsyncWrite + Unpin,
{
    for reply in replies {
        let mut line = reply.to_line()?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Runs the server until stdin closes or an interrupt arrives, then stops
/// the broadcast endpoint and closes the database.
pub async fn run(config: Config) -> Result<(), SqlMemoError> {
    let ctx = AppContext::open(&config)?;
    let session = Arc::new(RpcSession::new(ctx.dispatcher()));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let http_task = config.broadcast.http_addr.map(|addr| {
        let hub = ctx.hub.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(err) = http::serve(addr, hub, shutdown).await {
                error!(target: SERVER_TARGET, error = %err, "broadcast endpoint failed");
            }
        })
    });

    info!(
        target: SERVER_TARGET,
        db = ctx.db.path(),
        http = ?config.broadcast.http_addr,
        "server ready on stdio"
    );

    let stdio = serve_stream(
        session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    let outcome = tokio::select! {
        res = stdio => {
            info!(target: SERVER_TARGET, "stdin closed");
            res
        }
        signal = tokio::signal::ctrl_c() => {
            info!(target: SERVER_TARGET, "interrupt received");
            signal.map_err(SqlMemoError::IoError)
        }
    };

    let _ = shutdown_tx.send(());
    if let Some(mut task) = http_task {
        match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(target: SERVER_TARGET, error = %err, "broadcast task did not stop cleanly");
            }
            Err(_) => {
                warn!(target: SERVER_TARGET, "broadcast endpoint did not drain in time, aborting");
                task.abort();
            }
        }
    }
    ctx.db.close()?;
    info!(target: SERVER_TARGET, "shutdown complete");
    outcome
}
