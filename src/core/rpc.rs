//! JSON-RPC 2.0 protocol surface.
//!
//! Clients speak newline-delimited JSON-RPC over stdin/stdout using the
//! Model Context Protocol method names.
//!
//! # Methods
//!
//! - `initialize`, `ping`
//! - `tools/list`, `tools/call`
//! - `resources/list`, `resources/read`
//! - `prompts/list`, `prompts/get`
//!
//! Messages without an `id` are notifications and are never answered.
//! A batch is answered with one array holding a response per request.
//! A successful `append_insight` call is followed by a
//! `notifications/resources/updated` notification for the memo.

use crate::core::catalog;
use crate::core::dispatch::{DISPATCH_TARGET, Dispatcher, ToolResult};
use crate::core::error::{DispatchError, codes};
use crate::core::insights::{self, INSIGHTS_MIME_TYPE, INSIGHTS_URI};
use crate::core::prompts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Inbound message. A missing `id` marks a notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: method.into(),
            params: Some(params),
            id: Some(id.into()),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(name))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&DispatchError> for RpcError {
    fn from(err: &DispatchError) -> Self {
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data: Some(json!({ "kind": err.kind() })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    pub fn resource_updated(uri: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/resources/updated".to_string(),
            params: Some(json!({ "uri": uri })),
        }
    }
}

/// Anything the server writes back. Each value is one output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Response(RpcResponse),
    Batch(Vec<RpcResponse>),
    Notification(RpcNotification),
}

impl Outbound {
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError {
        code,
        message: message.into(),
        data: None,
    }
}

/// Protocol state for one client connection.
pub struct RpcSession {
    dispatcher: Dispatcher,
}

impl RpcSession {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handles one raw input line.
    pub fn handle_line(&self, line: &str) -> Vec<Outbound> {
        self.handle_bytes(line.as_bytes())
    }

    /// Like [`Self::handle_line`], for input that may not be valid UTF-8.
    pub fn handle_bytes(&self, raw: &[u8]) -> Vec<Outbound> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(value) => self.handle_value(value),
            Err(err) => vec![Outbound::Response(RpcResponse::failure(
                Value::Null,
                rpc_error(codes::PARSE_ERROR, format!("Parse error: {err}")),
            ))],
        }
    }

    /// Handles one decoded message, or a batch of them.
    ///
    /// Notifications raised while handling a batch follow the batch reply.
    pub fn handle_value(&self, value: Value) -> Vec<Outbound> {
        let Value::Array(items) = value else {
            return self.handle_single(value);
        };
        if items.is_empty() {
            return self.handle_single(Value::Array(items));
        }

        let mut responses = Vec::with_capacity(items.len());
        let mut trailing = Vec::new();
        for item in items {
            for out in self.handle_single(item) {
                match out {
                    Outbound::Response(r) => responses.push(r),
                    other => trailing.push(other),
                }
            }
        }
        let mut out = Vec::with_capacity(trailing.len() + 1);
        if !responses.is_empty() {
            out.push(Outbound::Batch(responses));
        }
        out.extend(trailing);
        out
    }

    fn handle_single(&self, value: Value) -> Vec<Outbound> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => self.handle(request),
            Err(err) => vec![Outbound::Response(RpcResponse::failure(
                id,
                rpc_error(codes::INVALID_REQUEST, format!("Invalid request: {err}")),
            ))],
        }
    }

    pub fn handle(&self, request: RpcRequest) -> Vec<Outbound> {
        debug!(target: DISPATCH_TARGET, method = %request.method, "rpc request");

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return Vec::new();
        };

        let mut out = Vec::with_capacity(2);
        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": catalog::CATALOG.iter().map(|op| op.describe()).collect::<Vec<_>>()
            })),
            "tools/call" => self.call_tool(&request, &mut out),
            "resources/list" => Ok(json!({ "resources": [insights::insights_resource()] })),
            "resources/read" => self.read_resource(&request),
            "prompts/list" => Ok(json!({ "prompts": prompts::list_prompts() })),
            "prompts/get" => self.get_prompt(&request),
            other => Err(rpc_error(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        let response = match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(error) => RpcResponse::failure(id, error),
        };
        out.insert(0, Outbound::Response(response));
        out
    }

    fn handle_notification(&self, request: &RpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => debug!(target: DISPATCH_TARGET, "client initialized"),
            "notifications/cancelled" => debug!(target: DISPATCH_TARGET, "client cancelled a request"),
            other => debug!(target: DISPATCH_TARGET, method = other, "ignoring notification"),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": { "subscribe": false, "listChanged": false },
                "prompts": {},
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn call_tool(&self, request: &RpcRequest, out: &mut Vec<Outbound>) -> Result<Value, RpcError> {
        let name = request
            .param("name")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(codes::INVALID_REQUEST, "tools/call requires a string `name`"))?;
        let outcome = self.dispatcher.dispatch(name, request.param("arguments"));
        let result: ToolResult = outcome.map_err(|err| RpcError::from(&err))?;
        if name == "append_insight" {
            out.push(Outbound::Notification(RpcNotification::resource_updated(
                INSIGHTS_URI,
            )));
        }
        serde_json::to_value(result).map_err(|e| rpc_error(codes::INTERNAL_ERROR, e.to_string()))
    }

    fn read_resource(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let uri = request
            .param("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(codes::INVALID_REQUEST, "resources/read requires a string `uri`"))?;
        let text = self
            .dispatcher
            .insights()
            .read_resource(uri)
            .map_err(|err| {
                warn!(target: DISPATCH_TARGET, uri, error = %err, "resource read failed");
                RpcError::from(&err)
            })?;
        Ok(json!({
            "contents": [{ "uri": uri, "mimeType": INSIGHTS_MIME_TYPE, "text": text }]
        }))
    }

    fn get_prompt(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let name = request
            .param("name")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(codes::INVALID_REQUEST, "prompts/get requires a string `name`"))?;
        prompts::get_prompt(name, request.param("arguments")).map_err(|err| RpcError::from(&err))
    }
}
