use sqlmemo::core::config::Config;
use sqlmemo::core::db::{self, Database};
use sqlmemo::core::error::DispatchError;
use sqlmemo::core::server::AppContext;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn file_backed_store_survives_reopen() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("persist.db");
    let path = path.to_string_lossy().to_string();

    let db = Database::open(&path, Duration::from_secs(1)).expect("open");
    db.execute_batch("CREATE TABLE notes(id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
        .expect("create");
    assert_eq!(
        db.execute("INSERT INTO notes(body) VALUES ('kept')").expect("insert"),
        Some(1)
    );
    db.close().expect("close");

    let reopened = Database::open(&path, Duration::from_secs(1)).expect("reopen");
    let rows = reopened.query_rows("SELECT body FROM notes").expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["body"], "kept");
}

#[test]
fn file_backed_connections_use_wal_and_foreign_keys() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("pragmas.db");
    let conn = db::db_connect(&path.to_string_lossy(), Duration::from_secs(1)).expect("connect");

    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .expect("journal mode");
    assert_eq!(mode.to_lowercase(), "wal");
    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .expect("foreign keys");
    assert_eq!(fk, 1);
}

#[test]
fn foreign_key_violations_surface_as_execution_errors() {
    let db = Database::in_memory().expect("db");
    db.execute_batch(
        "CREATE TABLE parent(id INTEGER PRIMARY KEY);
         CREATE TABLE child(id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id));",
    )
    .expect("schema");
    let err = db
        .execute("INSERT INTO child(parent_id) VALUES (99)")
        .expect_err("fk violation");
    assert!(matches!(err, DispatchError::Execution(_)));
    assert!(err.to_string().to_lowercase().contains("foreign key"), "{err}");
}

#[test]
fn concurrent_writers_are_serialized_through_one_handle() {
    let db = Arc::new(Database::in_memory().expect("db"));
    db.execute_batch("CREATE TABLE hits(n INTEGER)").expect("create");

    let workers = 8;
    let per_worker = 25;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_worker {
                    db.execute(&format!("INSERT INTO hits VALUES ({})", w * per_worker + i))
                        .expect("insert");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }

    let rows = db.query_rows("SELECT COUNT(*) AS c FROM hits").expect("count");
    assert_eq!(rows[0]["c"], json!(workers * per_worker));
}

#[test]
fn app_context_opens_the_configured_store() {
    let tmp = TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.database.path = tmp.path().join("ctx.db").to_string_lossy().to_string();

    let ctx = AppContext::open(&config).expect("context");
    let dispatcher = ctx.dispatcher();
    dispatcher
        .dispatch("create_table", Some(&json!({"query": "CREATE TABLE t(x)"})))
        .expect("create");
    assert_eq!(ctx.db.table_names().expect("names"), vec!["t".to_string()]);
    assert!(ctx.insights.is_empty());
    assert_eq!(ctx.hub.listener_count(), 0);
}
