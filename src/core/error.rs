use std::io;
use thiserror::Error;

/// Ambient failures: opening the store, reading config, process plumbing.
#[derive(Error, Debug)]
pub enum SqlMemoError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON-RPC error codes used on the protocol surface.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Failures surfaced by the dispatcher and the resource/prompt lookups.
///
/// Every variant maps to exactly one protocol error code via
/// [`DispatchError::rpc_code`].
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown tool: {name}")]
    UnknownOperation { name: String },

    #[error("Unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("Unknown prompt: {name}")]
    UnknownPrompt { name: String },

    #[error("Invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("{message}")]
    PolicyViolation { operation: String, message: String },

    #[error("{0}")]
    Execution(#[source] rusqlite::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    pub fn unknown_resource(uri: impl Into<String>) -> Self {
        Self::UnknownResource { uri: uri.into() }
    }

    pub fn unknown_prompt(name: impl Into<String>) -> Self {
        Self::UnknownPrompt { name: name.into() }
    }

    pub fn invalid_arguments(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn policy_violation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Protocol error code for this failure.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::UnknownOperation { .. }
            | Self::UnknownResource { .. }
            | Self::UnknownPrompt { .. }
            | Self::InvalidArguments { .. } => codes::INVALID_REQUEST,
            Self::PolicyViolation { .. } => codes::INVALID_PARAMS,
            Self::Execution(_) | Self::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }

    /// Stable snake_case label, used in logs and the one-shot CLI envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::UnknownResource { .. } => "unknown_resource",
            Self::UnknownPrompt { .. } => "unknown_prompt",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::Execution(_) => "execution_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<rusqlite::Error> for DispatchError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Execution(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape_errors_map_to_invalid_request() {
        assert_eq!(
            DispatchError::unknown_operation("drop_everything").rpc_code(),
            codes::INVALID_REQUEST
        );
        assert_eq!(
            DispatchError::unknown_resource("memo://nope").rpc_code(),
            codes::INVALID_REQUEST
        );
        assert_eq!(
            DispatchError::unknown_prompt("nope").rpc_code(),
            codes::INVALID_REQUEST
        );
        assert_eq!(
            DispatchError::invalid_arguments("read_query", "missing query").rpc_code(),
            codes::INVALID_REQUEST
        );
    }

    #[test]
    fn policy_violation_maps_to_invalid_params() {
        let err = DispatchError::policy_violation("read_query", "Only SELECT queries are allowed");
        assert_eq!(err.rpc_code(), codes::INVALID_PARAMS);
        assert_eq!(err.to_string(), "Only SELECT queries are allowed");
        assert_eq!(err.kind(), "policy_violation");
    }

    #[test]
    fn engine_failures_map_to_internal_error() {
        let err: DispatchError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.rpc_code(), codes::INTERNAL_ERROR);
        assert_eq!(err.kind(), "execution_error");
    }
}
