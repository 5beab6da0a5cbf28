//! Database driver registry and DSN normalization.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rusqlite::Connection;

use super::tx::TxQuerier;
use super::DbError;

/// Name the bundled SQLite engine is registered under.
pub const BUNDLED_SQLITE: &str = "bundled-sqlite";

/// Name of a natively provided SQLite driver that takes precedence over the bundled one.
pub const NATIVE_SQLITE: &str = "sqlite3";

const SQLITE_SCHEMES: &[&str] = &["sqlite", "sqlite3", "sq", "file"];

/// Opens a connection for a driver-specific target.
pub type Opener = Arc<dyn Fn(&str) -> Result<Box<dyn TxQuerier>, DbError> + Send + Sync>;

static DRIVERS: Lazy<RwLock<HashMap<String, Opener>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or replace) a driver.
pub fn register_driver(name: impl Into<String>, opener: Opener) {
    DRIVERS.write().insert(name.into(), opener);
}

/// Register the bundled SQLite driver unless it is already present.
///
/// Safe to call any number of times.
pub fn register_builtin_drivers() {
    let mut drivers = DRIVERS.write();
    if !drivers.contains_key(BUNDLED_SQLITE) {
        drivers.insert(BUNDLED_SQLITE.to_string(), Arc::new(open_bundled_sqlite));
        tracing::debug!(driver = BUNDLED_SQLITE, "Registered bundled driver");
    }
}

/// Whether a driver with this name is registered.
pub fn has_driver(name: &str) -> bool {
    DRIVERS.read().contains_key(name)
}

/// Names of all registered drivers, sorted.
pub fn drivers() -> Vec<String> {
    let mut names: Vec<String> = DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}

/// A DSN resolved to a driver name and the target that driver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDsn {
    pub driver: String,
    pub target: String,
}

/// Resolve scheme aliases and rewrite Spanner URLs into resource paths.
pub fn normalize_dsn(dsn: &str) -> Result<ResolvedDsn, DbError> {
    let (scheme, rest) = match dsn.split_once("://") {
        Some(parts) => parts,
        None => match dsn.split_once(':') {
            Some(("file", rest)) => ("file", rest),
            _ => return Err(DbError::InvalidDsn(dsn.to_string())),
        },
    };

    if scheme == "spanner" || scheme == "sp" {
        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        let [project, instance, database] = parts.as_slice() else {
            return Err(DbError::InvalidDsn(dsn.to_string()));
        };
        return Ok(ResolvedDsn {
            driver: "spanner".to_string(),
            target: format!("projects/{project}/instances/{instance}/databases/{database}"),
        });
    }

    if SQLITE_SCHEMES.contains(&scheme) {
        let driver = if has_driver(NATIVE_SQLITE) { NATIVE_SQLITE } else { BUNDLED_SQLITE };
        return Ok(ResolvedDsn { driver: driver.to_string(), target: rest.to_string() });
    }

    Ok(ResolvedDsn { driver: scheme.to_string(), target: dsn.to_string() })
}

/// Open a connection for a DSN through the registry.
pub fn open(dsn: &str) -> Result<Box<dyn TxQuerier>, DbError> {
    let resolved = normalize_dsn(dsn)?;
    let opener = DRIVERS
        .read()
        .get(&resolved.driver)
        .cloned()
        .ok_or_else(|| DbError::UnsupportedDriver(resolved.driver.clone()))?;
    tracing::debug!(driver = %resolved.driver, target = %resolved.target, "Opening database");
    opener(&resolved.target)
}

fn open_bundled_sqlite(target: &str) -> Result<Box<dyn TxQuerier>, DbError> {
    let path = target.split('?').next().unwrap_or_default();
    let conn = if path.is_empty() || path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(path)?
    };
    Ok(Box::new(conn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_aliases_use_bundled_driver() {
        for dsn in ["sqlite:///tmp/a.db", "sqlite3:///tmp/a.db", "sq:///tmp/a.db"] {
            let resolved = normalize_dsn(dsn).unwrap();
            assert_eq!(resolved.target, "/tmp/a.db");
            assert!(resolved.driver == BUNDLED_SQLITE || resolved.driver == NATIVE_SQLITE);
        }
        assert_eq!(normalize_dsn("file:test.db").unwrap().target, "test.db");
    }

    #[test]
    fn test_spanner_rewrite() {
        let resolved = normalize_dsn("spanner://proj/inst/db").unwrap();
        assert_eq!(resolved.driver, "spanner");
        assert_eq!(resolved.target, "projects/proj/instances/inst/databases/db");

        let resolved = normalize_dsn("sp://p/i/d").unwrap();
        assert_eq!(resolved.target, "projects/p/instances/i/databases/d");

        assert!(normalize_dsn("sp://p/i").is_err());
    }

    #[test]
    fn test_other_schemes_keep_full_dsn() {
        let resolved = normalize_dsn("postgres://u:p@localhost:5432/app").unwrap();
        assert_eq!(resolved.driver, "postgres");
        assert_eq!(resolved.target, "postgres://u:p@localhost:5432/app");
        assert!(normalize_dsn("not a dsn").is_err());
    }

    #[test]
    fn test_register_builtin_is_idempotent() {
        register_builtin_drivers();
        register_builtin_drivers();
        assert_eq!(drivers().iter().filter(|d| *d == BUNDLED_SQLITE).count(), 1);
    }

    #[test]
    fn test_open_unknown_driver_fails() {
        register_builtin_drivers();
        let err = open("mysql://root@localhost/app").err().unwrap();
        assert!(matches!(err, DbError::UnsupportedDriver(ref d) if d == "mysql"));
    }

    #[test]
    fn test_registered_network_driver_receives_full_dsn() {
        register_driver(
            "pgtest",
            Arc::new(|target: &str| -> Result<Box<dyn TxQuerier>, DbError> {
                assert_eq!(target, "pgtest://u:p@localhost:5432/app");
                Ok(Box::new(Connection::open_in_memory()?))
            }),
        );
        assert!(has_driver("pgtest"));

        let mut client = open("pgtest://u:p@localhost:5432/app").unwrap();
        let tx = client.begin().unwrap();
        assert_eq!(tx.query("SELECT 1").unwrap().rows.len(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn test_registered_spanner_driver_receives_resource_path() {
        register_driver(
            "spanner",
            Arc::new(|target: &str| -> Result<Box<dyn TxQuerier>, DbError> {
                assert_eq!(target, "projects/p/instances/i/databases/d");
                Ok(Box::new(Connection::open_in_memory()?))
            }),
        );
        assert!(open("spanner://p/i/d").is_ok());
        assert!(drivers().contains(&"spanner".to_string()));
    }

    #[test]
    fn test_open_in_memory() {
        register_builtin_drivers();
        let mut client = open("sqlite://:memory:").unwrap();
        let tx = client.begin().unwrap();
        let rows = tx.query("SELECT 1").unwrap();
        assert_eq!(rows.rows.len(), 1);
        tx.commit().unwrap();
    }
}
