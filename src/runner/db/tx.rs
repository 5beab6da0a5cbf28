//! Transaction handles over SQLite connections.
//!
//! The runner never cares whether it owns its connection or shares one with
//! a caller that already opened a transaction: [`TxQuerier::begin`] issues
//! `BEGIN` on an idle connection and a `SAVEPOINT` when a transaction is
//! already open, and [`Tx`] exposes the same exec/query/commit/rollback
//! surface for both.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, InterruptHandle};

use super::coerce::ColumnValue;
use super::DbError;

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Something a transaction can be opened on.
pub trait TxQuerier: Send {
    /// Open a transaction, nesting as a savepoint if one is already open.
    fn begin(&mut self) -> Result<Tx<'_>, DbError>;

    /// Handle that aborts a statement running on this client from another thread.
    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        None
    }
}

impl TxQuerier for Connection {
    fn begin(&mut self) -> Result<Tx<'_>, DbError> {
        Tx::open(ConnRef::Borrowed(self))
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        Some(self.get_interrupt_handle())
    }
}

impl TxQuerier for Box<dyn TxQuerier> {
    fn begin(&mut self) -> Result<Tx<'_>, DbError> {
        (**self).begin()
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        (**self).interrupt_handle()
    }
}

/// A connection shared between the runner and its caller.
///
/// The caller may `BEGIN` on it before handing a clone to a runner; the
/// runner's work then nests inside that transaction and is discarded if the
/// caller rolls back.
#[derive(Debug, Clone)]
pub struct SharedConnection(Arc<Mutex<Connection>>);

impl SharedConnection {
    /// Wrap a connection.
    pub fn new(conn: Connection) -> Self {
        Self(Arc::new(Mutex::new(conn)))
    }

    /// Lock the connection for direct use.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.0.lock()
    }
}

impl TxQuerier for SharedConnection {
    fn begin(&mut self) -> Result<Tx<'_>, DbError> {
        Tx::open(ConnRef::Locked(self.0.lock()))
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        Some(self.0.lock().get_interrupt_handle())
    }
}

enum ConnRef<'c> {
    Borrowed(&'c Connection),
    Locked(MutexGuard<'c, Connection>),
}

impl Deref for ConnRef<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::Borrowed(conn) => conn,
            Self::Locked(guard) => guard,
        }
    }
}

/// Outcome of a mutation statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub last_insert_id: i64,
    pub rows_affected: i64,
}

/// Raw rows of a query, before type coercion.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    /// Column name and declared type, in select order.
    pub columns: Vec<(String, Option<String>)>,
    pub rows: Vec<Vec<ColumnValue>>,
}

/// An open (possibly nested) transaction.
pub struct Tx<'c> {
    conn: ConnRef<'c>,
    savepoint: Option<String>,
    finished: bool,
}

impl<'c> Tx<'c> {
    fn open(conn: ConnRef<'c>) -> Result<Self, DbError> {
        let savepoint = if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
            None
        } else {
            let name = format!("scenarun_sp_{}", SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed));
            conn.execute_batch(&format!("SAVEPOINT {name}"))?;
            Some(name)
        };
        tracing::trace!(nested = savepoint.is_some(), "Transaction opened");
        Ok(Self { conn, savepoint, finished: false })
    }

    /// Whether this transaction is a savepoint inside an outer transaction.
    pub fn is_nested(&self) -> bool {
        self.savepoint.is_some()
    }

    /// Execute a statement for its side effects.
    ///
    /// Rows the statement returns (`RETURNING`, `PRAGMA`, a `WITH` query)
    /// are stepped through and discarded.
    pub fn exec(&self, stmt: &str) -> Result<ExecOutcome, DbError> {
        let mut prepared = self.conn.prepare(stmt)?;
        let mut rows = prepared.query([])?;
        while rows.next()?.is_some() {}
        drop(rows);
        Ok(ExecOutcome {
            last_insert_id: self.conn.last_insert_rowid(),
            rows_affected: i64::try_from(self.conn.changes()).unwrap_or(i64::MAX),
        })
    }

    /// Run a query and collect every row.
    pub fn query(&self, stmt: &str) -> Result<QueryRows, DbError> {
        let mut prepared = self.conn.prepare(stmt)?;
        let columns: Vec<(String, Option<String>)> = prepared
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();

        let mut out = QueryRows { columns, rows: Vec::new() };
        let mut rows = prepared.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(out.columns.len());
            for i in 0..out.columns.len() {
                values.push(ColumnValue::from(row.get_ref(i)?));
            }
            out.rows.push(values);
        }
        Ok(out)
    }

    /// Commit (or release the savepoint).
    pub fn commit(mut self) -> Result<(), DbError> {
        self.finished = true;
        match &self.savepoint {
            None => self.conn.execute_batch("COMMIT")?,
            Some(name) => self.conn.execute_batch(&format!("RELEASE {name}"))?,
        }
        Ok(())
    }

    /// Roll back (to the savepoint, when nested).
    pub fn rollback(mut self) -> Result<(), DbError> {
        self.finished = true;
        self.rollback_inner()
    }

    fn rollback_inner(&self) -> Result<(), DbError> {
        match &self.savepoint {
            None => self.conn.execute_batch("ROLLBACK")?,
            Some(name) => {
                self.conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
            }
        }
        Ok(())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.rollback_inner() {
                tracing::warn!(error = %e, "Failed to roll back abandoned transaction");
            }
        }
    }
}
