//! Operation dispatch.
//!
//! `Dispatcher::dispatch` resolves a name against the catalog, validates the
//! arguments, applies the execution policy and runs the handler. Handlers
//! only ever see validated arguments and return a complete envelope or an
//! error; there are no partial results.

use crate::core::catalog::{self, ValidatedArgs};
use crate::core::db::Database;
use crate::core::error::DispatchError;
use crate::core::insights::InsightsLog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

pub const TABLE_CREATED: &str = "Table created successfully";
pub const INSIGHT_ADDED: &str = "Insight added successfully";

/// One block of a result envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// The uniform success envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    fn pretty_json<T: Serialize>(value: &T) -> Result<Self, DispatchError> {
        serde_json::to_string_pretty(value)
            .map(Self::text)
            .map_err(|e| DispatchError::internal(format!("failed to serialize result: {e}")))
    }

    /// Concatenated text of every block.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Shared state a handler may touch.
pub struct OperationContext<'a> {
    pub db: &'a Database,
    pub insights: &'a InsightsLog,
}

pub type Handler = fn(&OperationContext<'_>, &ValidatedArgs) -> Result<ToolResult, DispatchError>;

/// Owns references to the database handle and the insights log.
#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<Database>,
    insights: Arc<InsightsLog>,
}

impl Dispatcher {
    pub fn new(db: Arc<Database>, insights: Arc<InsightsLog>) -> Self {
        Self { db, insights }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn insights(&self) -> &Arc<InsightsLog> {
        &self.insights
    }

    /// Runs operation `name` with `arguments`.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` for names outside the catalog, `InvalidArguments`
    /// for shape failures, `PolicyViolation` for statements of the wrong
    /// kind and `Execution` for anything the engine rejects.
    pub fn dispatch(&self, name: &str, arguments: Option<&Value>) -> Result<ToolResult, DispatchError> {
        let op = catalog::lookup(name).ok_or_else(|| DispatchError::unknown_operation(name))?;
        debug!(
            target: DISPATCH_TARGET,
            operation = op.name,
            policy = op.policy.as_str(),
            "dispatching operation"
        );

        let outcome = op
            .validate(arguments)
            .and_then(|args| op.check_policy(&args).map(|()| args))
            .and_then(|args| {
                let ctx = OperationContext {
                    db: &self.db,
                    insights: &self.insights,
                };
                (op.handler)(&ctx, &args)
            });

        if let Err(err) = &outcome {
            warn!(
                target: DISPATCH_TARGET,
                operation = op.name,
                kind = err.kind(),
                error = %err,
                "operation failed"
            );
        }
        outcome
    }
}

#[derive(Serialize)]
struct WriteOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    affected_rows: Option<u64>,
}

pub(crate) fn read_query(
    ctx: &OperationContext<'_>,
    args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    let rows = ctx.db.query_rows(args.require_str("query")?)?;
    ToolResult::pretty_json(&rows)
}

// Accepts any statement kind, unlike read_query and create_table.
pub(crate) fn write_query(
    ctx: &OperationContext<'_>,
    args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    let affected_rows = ctx.db.execute(args.require_str("query")?)?;
    serde_json::to_string(&WriteOutcome { affected_rows })
        .map(ToolResult::text)
        .map_err(|e| DispatchError::internal(format!("failed to serialize result: {e}")))
}

pub(crate) fn create_table(
    ctx: &OperationContext<'_>,
    args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    ctx.db.execute_single(args.require_str("query")?)?;
    Ok(ToolResult::text(TABLE_CREATED))
}

pub(crate) fn list_tables(
    ctx: &OperationContext<'_>,
    _args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    ToolResult::pretty_json(&ctx.db.table_names()?)
}

pub(crate) fn describe_table(
    ctx: &OperationContext<'_>,
    args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    ToolResult::pretty_json(&ctx.db.table_columns(args.require_str("table_name")?)?)
}

pub(crate) fn append_insight(
    ctx: &OperationContext<'_>,
    args: &ValidatedArgs,
) -> Result<ToolResult, DispatchError> {
    ctx.insights.append(args.require_str("insight")?)?;
    Ok(ToolResult::text(INSIGHT_ADDED))
}
