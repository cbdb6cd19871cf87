//! The fixed operation catalog.
//!
//! Six operations, registered at compile time. Each entry carries its input
//! shape, its execution policy and the handler that runs it. The catalog is a
//! `static` slice and never changes after startup.

use crate::core::dispatch::{self, Handler};
use crate::core::error::DispatchError;
use crate::core::policy::ExecutionPolicy;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Primitive type accepted for an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

/// One catalog entry.
pub struct OperationDef {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
    pub policy: ExecutionPolicy,
    /// Field holding the statement text the policy inspects, if any.
    pub statement_field: Option<&'static str>,
    pub handler: Handler,
}

impl std::fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDef")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

const fn required_string(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::String,
        required: true,
        description,
    }
}

pub static CATALOG: &[OperationDef] = &[
    OperationDef {
        name: "read_query",
        description: "Execute a SELECT query on the SQLite database",
        fields: &[required_string("query", "SELECT SQL query to execute")],
        policy: ExecutionPolicy::ReadOnly,
        statement_field: Some("query"),
        handler: dispatch::read_query,
    },
    OperationDef {
        name: "write_query",
        description: "Execute an INSERT, UPDATE, or DELETE query on the SQLite database",
        fields: &[required_string("query", "SQL query to execute")],
        policy: ExecutionPolicy::Mutating,
        statement_field: Some("query"),
        handler: dispatch::write_query,
    },
    OperationDef {
        name: "create_table",
        description: "Create a new table in the SQLite database",
        fields: &[required_string("query", "CREATE TABLE SQL statement")],
        policy: ExecutionPolicy::SchemaDefining,
        statement_field: Some("query"),
        handler: dispatch::create_table,
    },
    OperationDef {
        name: "list_tables",
        description: "List all tables in the SQLite database",
        fields: &[],
        policy: ExecutionPolicy::ReadOnly,
        statement_field: None,
        handler: dispatch::list_tables,
    },
    OperationDef {
        name: "describe_table",
        description: "Get the schema information for a specific table",
        fields: &[required_string("table_name", "Name of the table to describe")],
        policy: ExecutionPolicy::ReadOnly,
        statement_field: None,
        handler: dispatch::describe_table,
    },
    OperationDef {
        name: "append_insight",
        description: "Add a business insight to the memo",
        fields: &[required_string("insight", "Business insight discovered from data analysis")],
        policy: ExecutionPolicy::None,
        statement_field: None,
        handler: dispatch::append_insight,
    },
];

pub fn lookup(name: &str) -> Option<&'static OperationDef> {
    CATALOG.iter().find(|op| op.name == name)
}

pub fn operation_names() -> Vec<&'static str> {
    CATALOG.iter().map(|op| op.name).collect()
}

/// Arguments that passed shape validation.
#[derive(Debug, Clone, Default)]
pub struct ValidatedArgs {
    values: Map<String, Value>,
}

impl ValidatedArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Required string field. Validation guarantees presence for declared
    /// required fields; anything else is an internal error.
    pub fn require_str(&self, name: &str) -> Result<&str, DispatchError> {
        self.str(name)
            .ok_or_else(|| DispatchError::internal(format!("validated argument `{name}` missing")))
    }
}

impl OperationDef {
    /// Validates `arguments` against the declared fields.
    ///
    /// `null` counts as absent. Fields not declared are dropped.
    ///
    /// # Errors
    ///
    /// `InvalidArguments` when a required field is absent, a field has the
    /// wrong primitive type, or `arguments` is not an object.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<ValidatedArgs, DispatchError> {
        let empty = Map::new();
        let provided = match arguments {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(DispatchError::invalid_arguments(
                    self.name,
                    "arguments must be an object",
                ));
            }
        };

        let mut values = Map::new();
        for field in self.fields {
            match provided.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(DispatchError::invalid_arguments(
                            self.name,
                            format!("missing required argument `{}`", field.name),
                        ));
                    }
                }
                Some(value) if field.kind.accepts(value) => {
                    values.insert(field.name.to_string(), value.clone());
                }
                Some(_) => {
                    return Err(DispatchError::invalid_arguments(
                        self.name,
                        format!("argument `{}` must be a {}", field.name, field.kind.as_str()),
                    ));
                }
            }
        }
        Ok(ValidatedArgs { values })
    }

    /// Applies the execution policy to the statement field, if there is one.
    pub fn check_policy(&self, args: &ValidatedArgs) -> Result<(), DispatchError> {
        match self.statement_field {
            Some(field) => self.policy.check(self.name, args.require_str(field)?),
            None => Ok(()),
        }
    }

    /// JSON Schema of the input shape, as advertised by `tools/list`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in self.fields {
            properties.insert(
                field.name.to_string(),
                json!({ "type": field.kind.as_str(), "description": field.description }),
            );
            if field.required {
                required.push(Value::from(field.name));
            }
        }
        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }

    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_six_uniquely_named_operations() {
        let names: HashSet<_> = CATALOG.iter().map(|op| op.name).collect();
        assert_eq!(CATALOG.len(), 6);
        assert_eq!(names.len(), 6);
        for name in [
            "read_query",
            "write_query",
            "create_table",
            "list_tables",
            "describe_table",
            "append_insight",
        ] {
            assert!(lookup(name).is_some(), "{name} missing");
        }
        assert!(lookup("READ_QUERY").is_none());
    }

    #[test]
    fn validation_reports_missing_required_field() {
        let op = lookup("read_query").unwrap();
        for args in [None, Some(json!({})), Some(json!({"query": null}))] {
            let err = op.validate(args.as_ref()).unwrap_err();
            assert!(matches!(err, DispatchError::InvalidArguments { .. }));
            assert!(err.to_string().contains("`query`"));
        }
    }

    #[test]
    fn validation_reports_wrong_primitive_type() {
        let op = lookup("describe_table").unwrap();
        let err = op.validate(Some(&json!({"table_name": 42}))).unwrap_err();
        assert!(err.to_string().contains("must be a string"));

        let err = op.validate(Some(&json!(["t"]))).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn validation_keeps_declared_fields_only() {
        let op = lookup("append_insight").unwrap();
        let args = op
            .validate(Some(&json!({"insight": "x", "extra": true})))
            .unwrap();
        assert_eq!(args.str("insight"), Some("x"));
        assert!(args.get("extra").is_none());
    }

    #[test]
    fn list_tables_takes_no_arguments() {
        let op = lookup("list_tables").unwrap();
        assert!(op.validate(None).is_ok());
        assert_eq!(op.input_schema(), json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn input_schema_lists_required_fields() {
        let schema = lookup("create_table").unwrap().input_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["query"]["type"], "string");
    }

    #[test]
    fn field_kinds_accept_matching_json() {
        assert!(FieldKind::Integer.accepts(&json!(3)));
        assert!(!FieldKind::Integer.accepts(&json!(3.5)));
        assert!(FieldKind::Number.accepts(&json!(3.5)));
        assert!(FieldKind::Boolean.accepts(&json!(false)));
        assert!(!FieldKind::String.accepts(&json!(false)));
    }
}
