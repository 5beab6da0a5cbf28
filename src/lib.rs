#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_wildcard_for_single_variants)]

//! # Scenarun
//!
//! Declarative scenario runner for API and database integration testing.
//!
//! A scenario ("book") is a YAML file listing steps that run in order
//! against a shared store. Each step makes one HTTP request, runs one SQL
//! script, executes one shell command or includes another book, and may
//! then assert on, print or bind values from the store.
//!
//! ## Features
//!
//! - **Templating**: `{{ expr }}` placeholders resolved against earlier results
//! - **Atomic SQL steps**: multi-statement scripts run in one transaction
//! - **Nested transactions**: run a scenario inside a caller's transaction
//! - **Assertions**: `test`, `dump` and `bind` side-runners on every step
//!
//! ## Quick Start
//!
//! ```yaml
//! desc: Create a user
//! runners:
//!   db: sqlite:///tmp/app.db
//! vars:
//!   name: alice
//! steps:
//!   - db:
//!       query: INSERT INTO users (name) VALUES ('{{ vars.name }}');
//!   - db:
//!       query: SELECT name FROM users WHERE id = {{ steps[0].last_insert_id }};
//!     test: steps[1].rows[0].name == vars.name
//! ```
//!
//! ```bash
//! scenarun run books/
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::future_not_send)]

pub mod book;
pub mod capture;
pub mod config;
pub mod error;
pub mod expr;
pub mod operator;
pub mod result;
pub mod runner;

// Re-export commonly used types
pub use book::Book;
pub use capture::{Capturer, Capturers};
pub use config::Config;
pub use error::{Error, Result};
pub use operator::{Operator, Operators, Options};
pub use result::{RunNResult, RunResult, StepResult};
pub use runner::{register_builtin_drivers, DbRunner, HttpRunner, SharedConnection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "scenarun";
