use serde_json::{Value, json};
use sqlmemo::core::catalog;
use sqlmemo::core::db::Database;
use sqlmemo::core::dispatch::{Dispatcher, INSIGHT_ADDED, TABLE_CREATED, ToolResult};
use sqlmemo::core::error::DispatchError;
use sqlmemo::core::insights::{INSIGHTS_URI, InsightsLog};
use std::sync::Arc;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(
        Arc::new(Database::in_memory().expect("db")),
        Arc::new(InsightsLog::new()),
    )
}

fn call(d: &Dispatcher, op: &str, args: Value) -> Result<ToolResult, DispatchError> {
    d.dispatch(op, Some(&args))
}

fn text(result: &ToolResult) -> String {
    assert_eq!(result.content.len(), 1, "exactly one text block");
    result.joined_text()
}

fn json_text(result: &ToolResult) -> Value {
    serde_json::from_str(&text(result)).expect("result text is JSON")
}

#[test]
fn concrete_create_insert_select_scenario() {
    let d = dispatcher();

    let created = call(
        &d,
        "create_table",
        json!({"query": "CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)"}),
    )
    .expect("create");
    assert_eq!(text(&created), TABLE_CREATED);

    let written = call(&d, "write_query", json!({"query": "INSERT INTO t(v) VALUES ('x')"}))
        .expect("insert");
    assert_eq!(json_text(&written), json!({"affected_rows": 1}));

    let read = call(&d, "read_query", json!({"query": "SELECT * FROM t"})).expect("select");
    assert_eq!(json_text(&read), json!([{"id": 1, "v": "x"}]));
}

#[test]
fn describe_table_reports_nullability_and_primary_key() {
    let d = dispatcher();
    call(
        &d,
        "create_table",
        json!({"query": "CREATE TABLE people(id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER DEFAULT 0)"}),
    )
    .expect("create");

    let described = call(&d, "describe_table", json!({"table_name": "people"})).expect("describe");
    let columns = json_text(&described);
    let columns = columns.as_array().expect("array");
    assert_eq!(columns.len(), 3);

    assert_eq!(columns[0]["name"], "id");
    assert_eq!(columns[0]["type"], "INTEGER");
    assert_eq!(columns[0]["pk"], 1);

    assert_eq!(columns[1]["name"], "name");
    assert_eq!(columns[1]["notnull"], 1);
    assert_eq!(columns[1]["pk"], 0);

    assert_eq!(columns[2]["name"], "age");
    assert_eq!(columns[2]["notnull"], 0);
    assert_eq!(columns[2]["dflt_value"], "0");
}

#[test]
fn results_are_pretty_printed() {
    let d = dispatcher();
    call(&d, "create_table", json!({"query": "CREATE TABLE a(x)"})).expect("create");
    let listed = call(&d, "list_tables", json!({})).expect("list");
    assert_eq!(text(&listed), "[\n  \"a\"\n]");
}

#[test]
fn every_operation_succeeds_on_an_empty_database() {
    let d = dispatcher();
    let cases = [
        ("read_query", json!({"query": "SELECT 1 AS one"})),
        ("write_query", json!({"query": "CREATE TABLE w(x)"})),
        ("create_table", json!({"query": "CREATE TABLE c(x)"})),
        ("list_tables", json!({})),
        ("describe_table", json!({"table_name": "c"})),
        ("append_insight", json!({"insight": "empty db is empty"})),
    ];
    assert_eq!(cases.len(), catalog::CATALOG.len());
    for (op, args) in cases {
        let result = call(&d, op, args).unwrap_or_else(|e| panic!("{op}: {e}"));
        assert_eq!(result.content.len(), 1, "{op}");
    }
}

#[test]
fn engine_failures_are_execution_errors() {
    let d = dispatcher();
    for (op, args) in [
        ("read_query", json!({"query": "SELECT * FROM missing"})),
        ("write_query", json!({"query": "INSERT INTO missing VALUES (1)"})),
        ("create_table", json!({"query": "CREATE TABLE broken("})),
    ] {
        let err = call(&d, op, args).expect_err(op);
        assert!(matches!(err, DispatchError::Execution(_)), "{op}: {err:?}");
    }
}

#[test]
fn read_query_rejects_non_select_regardless_of_payload() {
    let d = dispatcher();
    for query in [
        "INSERT INTO t VALUES (1)",
        "DROP TABLE t",
        "PRAGMA table_info(t)",
        "explain select 1",
        "(SELECT 1)",
    ] {
        let err = call(&d, "read_query", json!({"query": query})).expect_err(query);
        assert!(matches!(err, DispatchError::PolicyViolation { .. }), "{query}");
    }
}

#[test]
fn create_table_rejects_other_statements() {
    let d = dispatcher();
    for query in ["CREATE VIEW v AS SELECT 1", "INSERT INTO t VALUES (1)", "create index i on t(x)"] {
        let err = call(&d, "create_table", json!({"query": query})).expect_err(query);
        assert!(matches!(err, DispatchError::PolicyViolation { .. }), "{query}");
    }
    assert!(d.database().table_names().expect("names").is_empty());
}

#[test]
fn create_table_rejects_chained_statements() {
    let d = dispatcher();
    call(&d, "create_table", json!({"query": "CREATE TABLE a(x)"})).expect("create a");
    let err = call(&d, "create_table", json!({"query": "CREATE TABLE c(x); DROP TABLE a"}))
        .expect_err("chained statements");
    assert!(matches!(err, DispatchError::Execution(_)));
    assert_eq!(json_text(&call(&d, "list_tables", json!({})).expect("list")), json!(["a"]));
}

#[test]
fn ddl_through_write_query_reports_zero_rows() {
    let d = dispatcher();
    call(&d, "create_table", json!({"query": "CREATE TABLE a(x)"})).expect("create");
    let inserted = call(&d, "write_query", json!({"query": "INSERT INTO a VALUES (1), (2), (3)"}))
        .expect("insert");
    assert_eq!(json_text(&inserted), json!({"affected_rows": 3}));
    let created = call(&d, "write_query", json!({"query": "CREATE TABLE b(x)"})).expect("ddl");
    assert_eq!(json_text(&created), json!({"affected_rows": 0}));
}

#[test]
fn write_query_stays_permissive() {
    let d = dispatcher();
    call(&d, "write_query", json!({"query": "CREATE TABLE via_write(x)"})).expect("ddl via write");
    let selected = call(&d, "write_query", json!({"query": "SELECT * FROM via_write"}))
        .expect("select via write");
    assert_eq!(json_text(&selected), json!({}));
}

#[test]
fn list_tables_is_idempotent() {
    let d = dispatcher();
    call(&d, "create_table", json!({"query": "CREATE TABLE one(x)"})).expect("create");
    call(&d, "create_table", json!({"query": "CREATE TABLE two(x)"})).expect("create");
    let first = call(&d, "list_tables", json!({})).expect("list");
    let second = call(&d, "list_tables", json!({})).expect("list");
    assert_eq!(first, second);
    assert_eq!(json_text(&first), json!(["one", "two"]));
}

#[test]
fn insights_render_in_append_order() {
    let d = dispatcher();
    assert_eq!(
        text(&call(&d, "append_insight", json!({"insight": "A"})).expect("A")),
        INSIGHT_ADDED
    );
    call(&d, "append_insight", json!({"insight": "B"})).expect("B");
    assert_eq!(d.insights().read_resource(INSIGHTS_URI).expect("read"), "A\n\nB");
}

#[test]
fn unknown_operation_touches_nothing() {
    let d = dispatcher();
    let err = call(&d, "drop_database", json!({"query": "CREATE TABLE sneaky(x)"}))
        .expect_err("unknown");
    assert!(matches!(err, DispatchError::UnknownOperation { .. }));
    assert!(d.database().table_names().expect("names").is_empty());
    assert!(d.insights().is_empty());
}

#[test]
fn missing_arguments_are_invalid() {
    let d = dispatcher();
    for op in ["read_query", "write_query", "create_table", "describe_table", "append_insight"] {
        let err = d.dispatch(op, None).expect_err(op);
        assert!(matches!(err, DispatchError::InvalidArguments { .. }), "{op}");
    }
    assert!(d.insights().is_empty());
}
