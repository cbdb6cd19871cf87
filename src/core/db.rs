//! The database handle: one SQLite connection, one owner.
//!
//! All statements run while holding the handle's mutex, so at most one
//! statement is in flight regardless of how many callers share the handle.

use crate::core::error::{DispatchError, SqlMemoError};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Path that selects a volatile, process-local store.
pub const MEMORY_PATH: &str = ":memory:";

/// Default busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const DB_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::db");

/// A single result row, column order preserved.
pub type RowObject = Map<String, Value>;

pub fn db_connect(db_path: &str, busy_timeout: Duration) -> Result<Connection, SqlMemoError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)
        .map_err(SqlMemoError::RusqliteError)?;
    if db_path != MEMORY_PATH {
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
            .map_err(SqlMemoError::RusqliteError)?;
    }
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(SqlMemoError::RusqliteError)?;
    Ok(conn)
}

/// Shared handle over the one connection this process owns.
pub struct Database {
    path: String,
    conn: Mutex<Option<Connection>>,
}

impl Database {
    pub fn open(db_path: &str, busy_timeout: Duration) -> Result<Self, SqlMemoError> {
        let conn = db_connect(db_path, busy_timeout)?;
        info!(target: DB_TARGET, path = db_path, "database opened");
        Ok(Self {
            path: db_path.to_string(),
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, SqlMemoError> {
        Self::open(MEMORY_PATH, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| DispatchError::internal("database lock poisoned"))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| DispatchError::internal("database is closed"))?;
        f(conn).map_err(DispatchError::Execution)
    }

    /// Multi-row fetch. Each row becomes an object keyed by column name.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<RowObject>, DispatchError> {
        debug!(target: DB_TARGET, sql, "query");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let rows = stmt.query_map([], |row| row_to_object(row, &columns))?;
            rows.collect()
        })
    }

    /// Runs any single statement to completion.
    ///
    /// Returns the number of changed rows, or `None` when the statement is
    /// read-only and a change count would be meaningless.
    pub fn execute(&self, sql: &str) -> Result<Option<u64>, DispatchError> {
        debug!(target: DB_TARGET, sql, "execute");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let readonly = stmt.readonly();
            let before = total_changes(conn)?;
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
            drop(rows);
            if readonly {
                return Ok(None);
            }
            // changes() keeps the count of the last INSERT/UPDATE/DELETE, so
            // statements that changed nothing (DDL included) report zero.
            if total_changes(conn)? == before {
                Ok(Some(0))
            } else {
                Ok(Some(conn.changes() as u64))
            }
        })
    }

    /// Runs exactly one statement, discarding any rows.
    ///
    /// Trailing statements are rejected by `prepare` before anything runs.
    pub fn execute_single(&self, sql: &str) -> Result<(), DispatchError> {
        debug!(target: DB_TARGET, sql, "execute single");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
            Ok(())
        })
    }

    /// Runs one or more statements with no row result.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DispatchError> {
        debug!(target: DB_TARGET, sql, "execute batch");
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    pub fn table_names(&self) -> Result<Vec<String>, DispatchError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect()
        })
    }

    /// Column descriptors for `table`: `cid, name, type, notnull, dflt_value, pk`.
    ///
    /// The table name is bound as a parameter of `pragma_table_info`, never
    /// spliced into the statement text. An unknown table yields no columns.
    pub fn table_columns(&self, table: &str) -> Result<Vec<RowObject>, DispatchError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM pragma_table_info(?1)")?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let rows = stmt.query_map([table], |row| row_to_object(row, &columns))?;
            rows.collect()
        })
    }

    /// Closes the connection. Later calls fail with "database is closed".
    pub fn close(&self) -> Result<(), SqlMemoError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| SqlMemoError::ValidationError("database lock poisoned".to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, err)| SqlMemoError::RusqliteError(err))?;
            info!(target: DB_TARGET, path = %self.path, "database closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

fn total_changes(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
}

fn row_to_object(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<RowObject> {
    let mut obj = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        obj.insert(name.clone(), value_to_json(row.get_ref(idx)?));
    }
    Ok(obj)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}
