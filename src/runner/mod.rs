//! Step runners.
//!
//! Primary actions (HTTP, DB, exec, include) produce the value recorded for
//! a step. Named HTTP and DB runners live in a [`Runners`] registry; steps
//! resolve their runner key against it once, when the scenario is built.

pub mod db;
mod exec;
mod http;
pub mod side;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub use db::{
    register_builtin_drivers, run_blocking, DbError, DbQuery, DbResponse, DbRunner,
    SharedConnection, TxQuerier,
};
pub use exec::{ExecCommand, ExecRunner};
pub use http::{HttpBody, HttpRequest, HttpRunner};

#[cfg(test)]
pub(crate) use http::stub as http_stub;

use crate::error::{Error, Result};

/// Step key of the include runner.
pub const INCLUDE_RUNNER_KEY: &str = "include";
/// Step key of the exec runner.
pub const EXEC_RUNNER_KEY: &str = "exec";
/// Step key of the test side-runner.
pub const TEST_RUNNER_KEY: &str = "test";
/// Step key of the dump side-runner.
pub const DUMP_RUNNER_KEY: &str = "dump";
/// Step key of the bind side-runner.
pub const BIND_RUNNER_KEY: &str = "bind";
/// Book key of the scenario guard.
pub const IF_SECTION_KEY: &str = "if";
/// Book key of the scenario description.
pub const DESC_SECTION_KEY: &str = "desc";

/// Names that cannot be used for user-defined runners.
pub const RESERVED_RUNNER_NAMES: &[&str] = &[
    INCLUDE_RUNNER_KEY,
    TEST_RUNNER_KEY,
    DUMP_RUNNER_KEY,
    EXEC_RUNNER_KEY,
    BIND_RUNNER_KEY,
    IF_SECTION_KEY,
    DESC_SECTION_KEY,
];

/// A user-defined runner.
#[derive(Debug)]
pub enum Runner {
    Http(HttpRunner),
    Db(DbRunner),
}

impl Runner {
    /// Build a runner from its book definition: an `http(s)://` URL becomes
    /// an HTTP runner, any other string a DB runner.
    pub fn from_dsn(name: &str, dsn: &str) -> Result<Self> {
        if dsn.starts_with("https://") || dsn.starts_with("http://") {
            Ok(Self::Http(HttpRunner::new(name, dsn)?))
        } else {
            Ok(Self::Db(DbRunner::open(name, dsn)?))
        }
    }

    /// Runner name.
    pub fn name(&self) -> &str {
        match self {
            Self::Http(r) => r.name(),
            Self::Db(r) => r.name(),
        }
    }
}

/// Position of a runner in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerRef {
    Http(usize),
    Db(usize),
}

/// Registry of named runners.
#[derive(Debug, Default)]
pub struct Runners {
    http: Vec<HttpRunner>,
    db: Vec<Arc<Mutex<DbRunner>>>,
    index: HashMap<String, RunnerRef>,
}

impl Runners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runner; names must be unique and not reserved.
    pub fn insert(&mut self, runner: Runner) -> Result<RunnerRef> {
        let name = runner.name().to_string();
        if RESERVED_RUNNER_NAMES.contains(&name.as_str()) {
            return Err(Error::config(format!(
                "runner name '{name}' is reserved for built-in runner"
            )));
        }
        if self.index.contains_key(&name) {
            return Err(Error::config(format!("duplicate runner names: {name}")));
        }
        let slot = match runner {
            Runner::Http(r) => {
                self.http.push(r);
                RunnerRef::Http(self.http.len() - 1)
            }
            Runner::Db(r) => {
                self.db.push(Arc::new(Mutex::new(r)));
                RunnerRef::Db(self.db.len() - 1)
            }
        };
        self.index.insert(name, slot);
        Ok(slot)
    }

    /// Look a runner up by name.
    pub fn resolve(&self, name: &str) -> Option<RunnerRef> {
        self.index.get(name).copied()
    }

    /// Number of registered runners.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no runner is registered.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub(crate) fn http(&self, i: usize) -> &HttpRunner {
        &self.http[i]
    }

    pub(crate) fn db(&self, i: usize) -> Arc<Mutex<DbRunner>> {
        self.db[i].clone()
    }
}
