//! Database runner.
//!
//! Runs a step's SQL script statement by statement inside one transaction.
//! Any failing statement rolls the whole script back; only the outcome of
//! the last statement is recorded for the step.

mod coerce;
mod driver;
mod tx;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::InterruptHandle;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::capture::{Capturer, Capturers};

pub use coerce::{normalize, parse_datetime, ColumnValue};
pub use driver::{
    drivers, has_driver, normalize_dsn, open, register_builtin_drivers, register_driver, Opener,
    ResolvedDsn, BUNDLED_SQLITE, NATIVE_SQLITE,
};
pub use tx::{ExecOutcome, QueryRows, SharedConnection, Tx, TxQuerier};

/// Store key for the id of the last inserted row.
pub const LAST_INSERT_ID_KEY: &str = "last_insert_id";
/// Store key for the number of affected rows.
pub const ROWS_AFFECTED_KEY: &str = "rows_affected";
/// Store key for query rows.
pub const ROWS_KEY: &str = "rows";

/// Errors from the database runner.
#[derive(Debug, Error)]
pub enum DbError {
    /// Driver-level failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A byte-encoded column could not be coerced to its declared type.
    #[error("invalid column: evaluated {column}, but got {type_name}({value}): {reason}")]
    InvalidColumn { column: String, type_name: String, value: String, reason: String },

    /// No driver registered under this name.
    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),

    /// DSN could not be parsed.
    #[error("invalid dsn: {0}")]
    InvalidDsn(String),

    /// Step payload is not a `{query: <string>}` mapping.
    #[error("invalid db query: {0}")]
    InvalidQuery(String),

    /// The blocking task running the script panicked or was cancelled.
    #[error("db task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The script was cancelled before it started.
    #[error("db query cancelled")]
    Cancelled,
}

/// One step's SQL payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbQuery {
    pub stmt: String,
}

impl DbQuery {
    /// Build a query from raw SQL.
    pub fn new(stmt: impl Into<String>) -> Self {
        Self { stmt: stmt.into() }
    }

    /// Read a `{query: "..."}` step payload.
    pub fn from_value(v: &Value) -> Result<Self, DbError> {
        match v.get("query") {
            Some(Value::String(stmt)) => Ok(Self::new(stmt.clone())),
            _ => Err(DbError::InvalidQuery(v.to_string())),
        }
    }
}

/// Outcome of a single statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DbResponse {
    Exec(ExecOutcome),
    Query { columns: Vec<String>, rows: Vec<Map<String, Value>> },
}

impl DbResponse {
    /// Shape recorded in the store.
    pub fn into_value(self) -> Value {
        let mut out = Map::new();
        match self {
            Self::Exec(outcome) => {
                out.insert(LAST_INSERT_ID_KEY.to_string(), Value::from(outcome.last_insert_id));
                out.insert(ROWS_AFFECTED_KEY.to_string(), Value::from(outcome.rows_affected));
            }
            Self::Query { rows, .. } => {
                out.insert(
                    ROWS_KEY.to_string(),
                    Value::Array(rows.into_iter().map(Value::Object).collect()),
                );
            }
        }
        Value::Object(out)
    }
}

/// Runs SQL scripts against one database.
pub struct DbRunner {
    name: String,
    client: Box<dyn TxQuerier>,
}

impl std::fmt::Debug for DbRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRunner").field("name", &self.name).finish()
    }
}

impl DbRunner {
    /// Create a runner over any transaction-capable client: an owned
    /// connection, or a [`SharedConnection`] the caller may already have
    /// opened a transaction on.
    pub fn new(name: impl Into<String>, client: impl TxQuerier + 'static) -> Self {
        Self { name: name.into(), client: Box::new(client) }
    }

    /// Create a runner from a DSN through the driver registry.
    pub fn open(name: impl Into<String>, dsn: &str) -> Result<Self, DbError> {
        register_builtin_drivers();
        Ok(Self { name: name.into(), client: open(dsn)? })
    }

    /// Runner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle that aborts the statement this runner is executing.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.client.interrupt_handle()
    }

    /// Run a script atomically and return the value to record for the step.
    pub fn run(&mut self, query: &DbQuery) -> Result<Value, DbError> {
        self.run_with(query, &Capturers::new())
    }

    /// Like [`DbRunner::run`], reporting every statement and response to `capture`.
    pub fn run_with(&mut self, query: &DbQuery, capture: &dyn Capturer) -> Result<Value, DbError> {
        let stmts = separate_statements(&query.stmt);
        let tx = self.client.begin()?;
        let mut out = Value::Object(Map::new());

        for stmt in &stmts {
            tracing::debug!(runner = %self.name, stmt = %stmt, "Executing statement");
            capture.capture_db_statement(&self.name, stmt);
            match run_statement(&tx, stmt) {
                Ok(response) => {
                    capture.capture_db_response(&self.name, &response);
                    out = response.into_value();
                }
                Err(e) => {
                    tracing::debug!(runner = %self.name, error = %e, "Statement failed, rollback");
                    tx.rollback()?;
                    return Err(e);
                }
            }
        }

        tx.commit()?;
        Ok(out)
    }
}

/// Run a script on the blocking pool.
///
/// Dropping the returned future (a timeout, an aborted task) interrupts the
/// statement in flight; the script then fails and rolls back on its own
/// thread.
pub async fn run_blocking(
    runner: Arc<Mutex<DbRunner>>,
    query: DbQuery,
    capture: Arc<dyn Capturer>,
) -> Result<Value, DbError> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut guard = InterruptOnDrop { handle: runner.lock().interrupt_handle(), cancelled };
    let flag = guard.cancelled.clone();

    let task = tokio::task::spawn_blocking(move || {
        if flag.load(Ordering::SeqCst) {
            return Err(DbError::Cancelled);
        }
        runner.lock().run_with(&query, &*capture)
    });
    let result = task.await;
    guard.disarm();
    result?
}

struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
}

impl InterruptOnDrop {
    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("DB step cancelled, interrupting statement");
            self.cancelled.store(true, Ordering::SeqCst);
            handle.interrupt();
        }
    }
}

fn run_statement(tx: &Tx<'_>, stmt: &str) -> Result<DbResponse, DbError> {
    if !stmt.trim_start().to_uppercase().starts_with("SELECT") {
        return Ok(DbResponse::Exec(tx.exec(stmt)?));
    }

    let raw = tx.query(stmt)?;
    let mut rows = Vec::with_capacity(raw.rows.len());
    for values in raw.rows {
        let mut row = Map::new();
        for ((name, decl_type), value) in raw.columns.iter().zip(values) {
            row.insert(name.clone(), normalize(name, decl_type.as_deref(), value)?);
        }
        rows.push(row);
    }
    let columns = raw.columns.into_iter().map(|(name, _)| name).collect();
    Ok(DbResponse::Query { columns, rows })
}

/// Split a script on `;`, ignoring semicolons inside quoted literals.
///
/// Each statement keeps its terminating `;`. A trailing fragment without
/// `;` becomes the last statement once stray whitespace and the `\n`/`"`
/// residue of YAML block scalars are trimmed off. A script without any
/// `;` comes back unchanged as a single statement.
pub fn separate_statements(script: &str) -> Vec<String> {
    if !script.contains(';') {
        return vec![script.to_string()];
    }

    let mut stmts = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for c in script.chars() {
        current.push(c);
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                stmts.push(current.trim_matches(|c| c == ' ' || c == '\n').to_string());
                current.clear();
            }
            _ => {}
        }
    }

    let tail = trim_residue(&current).trim_start_matches([' ', '\n']);
    if !tail.is_empty() {
        stmts.push(tail.to_string());
    }
    stmts
}

fn trim_residue(s: &str) -> &str {
    let mut s = s;
    loop {
        let trimmed = s.trim_end_matches([' ', '\n', '"']);
        let trimmed = trimmed.strip_suffix("\\n").unwrap_or(trimmed);
        if trimmed.len() == s.len() {
            return s;
        }
        s = trimmed;
    }
}
