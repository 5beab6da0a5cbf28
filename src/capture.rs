//! Capture hooks for runner traffic.
//!
//! A [`Capturer`] sees every SQL statement a DB runner is about to execute
//! and every response it gets back, including column names that do not make
//! it into the store. The operator fans out to all registered capturers;
//! [`Debugger`] is the one installed for `--debug`.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use serde_json::Value;

use crate::expr::to_display_string;
use crate::operator::Output;
use crate::runner::DbResponse;

/// Receives runner traffic. Every hook defaults to doing nothing.
pub trait Capturer: Send + Sync {
    /// Called before a statement is executed.
    fn capture_db_statement(&self, _runner: &str, _stmt: &str) {}

    /// Called after a statement succeeded.
    fn capture_db_response(&self, _runner: &str, _response: &DbResponse) {}
}

/// Fan-out over several capturers, in registration order.
#[derive(Clone, Default)]
pub struct Capturers(Vec<Arc<dyn Capturer>>);

impl Capturers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capturer.
    pub fn push(&mut self, capturer: Arc<dyn Capturer>) {
        self.0.push(capturer);
    }

    /// Number of registered capturers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Capturers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Capturers").field(&self.0.len()).finish()
    }
}

impl Capturer for Capturers {
    fn capture_db_statement(&self, runner: &str, stmt: &str) {
        for c in &self.0 {
            c.capture_db_statement(runner, stmt);
        }
    }

    fn capture_db_response(&self, runner: &str, response: &DbResponse) {
        for c in &self.0 {
            c.capture_db_response(runner, response);
        }
    }
}

/// Writes statements and result tables to the debug output.
pub struct Debugger {
    out: Output,
}

impl Debugger {
    /// Create a debugger writing to `out`.
    pub fn new(out: Output) -> Self {
        Self { out }
    }

    fn write(&self, text: &str) {
        if let Err(e) = self.out.lock().write_all(text.as_bytes()) {
            tracing::warn!(error = %e, "Failed to write debug output");
        }
    }
}

impl Capturer for Debugger {
    fn capture_db_statement(&self, runner: &str, stmt: &str) {
        self.write(&format!("-----START QUERY ({runner})-----\n{stmt}\n-----END QUERY-----\n"));
    }

    fn capture_db_response(&self, runner: &str, response: &DbResponse) {
        self.write(&format_response(runner, response));
    }
}

fn format_response(runner: &str, response: &DbResponse) -> String {
    let mut text = format!("-----START QUERY RESULT ({runner})-----\n");
    match response {
        DbResponse::Exec(outcome) => {
            let _ = writeln!(text, "last_insert_id: {}", outcome.last_insert_id);
            let _ = writeln!(text, "rows_affected: {}", outcome.rows_affected);
        }
        DbResponse::Query { columns, rows } => {
            let _ = writeln!(text, "{}", columns.join(" | "));
            for row in rows {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| to_display_string(row.get(c).unwrap_or(&Value::Null)))
                    .collect();
                let _ = writeln!(text, "{}", cells.join(" | "));
            }
            let _ = writeln!(text, "({} rows)", rows.len());
        }
    }
    text.push_str("-----END QUERY RESULT-----\n");
    text
}
