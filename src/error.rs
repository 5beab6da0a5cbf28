//! Error types for scenario execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::expr::ExprError;
use crate::runner::DbError;

/// Result type for scenario operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed book or step, detected before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Several runners failed to build.
    #[error("{}", .0.join("\n"))]
    Runners(Vec<String>),

    /// An expression failed while expanding a step payload.
    #[error("Expansion failed: {source}\n{fragment}")]
    Expand {
        #[source]
        source: ExprError,
        fragment: String,
    },

    /// An expression produced a value that cannot be substituted.
    #[error("invalid format: {value}\n{fragment}")]
    InvalidFormat { value: String, fragment: String },

    /// Expression evaluation outside of expansion (guards, side-runners).
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// Database runner failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// HTTP runner failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// `test` condition evaluated to something other than `true`.
    #[error("({cond}) is not true")]
    Assertion { cond: String },

    /// A runner failed on a given step.
    #[error("{action} failed on {step}: {source}")]
    Step {
        action: &'static str,
        step: String,
        #[source]
        source: Box<Error>,
    },

    /// Included book could not be found.
    #[error("Book not found: {0}")]
    BookNotFound(PathBuf),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap `self` with the display name of the failing step.
    pub(crate) fn on_step(self, action: &'static str, step: impl Into<String>) -> Self {
        Self::Step { action, step: step.into(), source: Box::new(self) }
    }
}
