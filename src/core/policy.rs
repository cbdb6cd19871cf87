//! Statement-kind restrictions enforced before an operation runs.

use crate::core::error::DispatchError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Reads only; a statement argument must be a `SELECT`.
    ReadOnly,
    /// Changes data. No statement-kind restriction is applied.
    Mutating,
    /// Defines schema; a statement argument must be a `CREATE TABLE`.
    SchemaDefining,
    /// Never touches the database.
    None,
}

impl ExecutionPolicy {
    /// Lowercase prefix a statement must start with, after trimming.
    pub fn required_prefix(self) -> Option<&'static str> {
        match self {
            Self::ReadOnly => Some("select"),
            Self::SchemaDefining => Some("create table"),
            Self::Mutating | Self::None => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::Mutating => "mutating",
            Self::SchemaDefining => "schema_defining",
            Self::None => "none",
        }
    }

    /// Checks `statement` against this policy.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::PolicyViolation` when the trimmed, lowercased
    /// statement does not start with the required prefix.
    pub fn check(self, operation: &str, statement: &str) -> Result<(), DispatchError> {
        let Some(prefix) = self.required_prefix() else {
            return Ok(());
        };
        if statement.trim().to_lowercase().starts_with(prefix) {
            return Ok(());
        }
        let message = match self {
            Self::SchemaDefining => "Only CREATE TABLE statements are allowed".to_string(),
            _ => format!(
                "Only {} queries are allowed for {operation}",
                prefix.to_uppercase()
            ),
        };
        Err(DispatchError::policy_violation(operation, message))
    }
}
