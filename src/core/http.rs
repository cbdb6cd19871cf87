//! Push channel over HTTP.
//!
//! - `GET /events`: Server-Sent Events stream. One `connected` event on
//!   attach, then one `message` event per published value.
//! - `POST /messages`: publishes the JSON body verbatim to every stream.
//! - `GET /healthz`: liveness.

use crate::core::broadcast::{BroadcastHub, Listener};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

const HTTP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");

#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
}

/// Malformed or absent ingestion body.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("request body must be JSON: {0}")]
    InvalidBody(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl IngestionError {
    fn into_api_error(self) -> ApiError {
        let code = match &self {
            Self::InvalidBody(_) => "invalid_body",
        };
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: ErrorBody {
                    code,
                    message: self.to_string(),
                },
            }),
        )
    }
}

pub fn router(hub: BroadcastHub) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", get(events))
        .route("/messages", post(ingest_message))
        .with_state(AppState { hub })
}

async fn healthz() -> &'static str {
    "ok"
}

fn to_event(name: &'static str, payload: &Value) -> Result<Event, axum::Error> {
    Event::default().event(name).json_data(payload)
}

/// Handshake event followed by every message the listener receives.
pub fn event_stream(listener: Listener) -> impl Stream<Item = Result<Event, axum::Error>> {
    let handshake = to_event(
        "connected",
        &json!({ "status": "connected", "listener": listener.id() }),
    );
    tokio_stream::once(handshake).chain(listener.map(|message| to_event("message", &message)))
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let listener = state.hub.attach();
    info!(target: HTTP_TARGET, listener = listener.id(), "event stream opened");
    Sse::new(event_stream(listener)).keep_alive(KeepAlive::default())
}

async fn ingest_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(message) = body.map_err(|rejection| {
        warn!(target: HTTP_TARGET, error = %rejection.body_text(), "rejected ingestion body");
        IngestionError::InvalidBody(rejection.body_text()).into_api_error()
    })?;
    let listeners = state.hub.publish(&message);
    Ok(Json(json!({ "success": true, "listeners": listeners })))
}

/// Serves the push channel on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, hub: BroadcastHub, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    serve_on(TcpListener::bind(addr).await?, hub, shutdown).await
}

/// Serves on an already bound listener.
///
/// When `shutdown` resolves every event stream is ended, so open `/events`
/// connections do not hold up the graceful drain.
pub async fn serve_on<F>(
    listener: TcpListener,
    hub: BroadcastHub,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(target: HTTP_TARGET, addr = %listener.local_addr()?, "broadcast endpoint listening");
    let closer = hub.clone();
    let shutdown = async move {
        shutdown.await;
        let closed = closer.close_all();
        info!(target: HTTP_TARGET, closed, "closing event streams");
    };
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(shutdown)
        .await
}
