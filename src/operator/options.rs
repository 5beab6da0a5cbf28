//! Operator options.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::capture::{Capturer, Capturers};
use crate::runner::{DbRunner, HttpRunner, Runner};

/// Shared writer for debug and `dump` output.
pub type Output = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer as an [`Output`].
pub fn output(w: impl Write + Send + 'static) -> Output {
    Arc::new(Mutex::new(Box::new(w)))
}

/// Builder for an [`Operator`](super::Operator).
///
/// Values set here are applied on top of the book, if one is given.
#[derive(Default)]
pub struct Options {
    pub(crate) book: Option<PathBuf>,
    pub(crate) desc: Option<String>,
    pub(crate) vars: Map<String, Value>,
    pub(crate) runners: Vec<(String, String)>,
    pub(crate) prebuilt: Vec<Runner>,
    pub(crate) steps: Vec<(Option<String>, Value)>,
    pub(crate) interval: Option<Duration>,
    pub(crate) debug: bool,
    pub(crate) fail_fast: bool,
    pub(crate) included: bool,
    pub(crate) cond: Option<String>,
    pub(crate) out: Option<Output>,
    pub(crate) capturers: Capturers,
}

impl Options {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the scenario from a book file.
    #[must_use]
    pub fn book(mut self, path: impl Into<PathBuf>) -> Self {
        self.book = Some(path.into());
        self
    }

    /// Set the scenario description.
    #[must_use]
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Set a variable, overriding the book's value.
    #[must_use]
    pub fn var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Set several variables.
    #[must_use]
    pub fn vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// Define a runner by DSN or URL, replacing a book runner of the same name.
    #[must_use]
    pub fn runner(mut self, name: impl Into<String>, dsn: impl Into<String>) -> Self {
        self.runners.push((name.into(), dsn.into()));
        self
    }

    /// Use an already built HTTP runner.
    #[must_use]
    pub fn http_runner(mut self, runner: HttpRunner) -> Self {
        self.prebuilt.push(Runner::Http(runner));
        self
    }

    /// Use an already built DB runner, e.g. one over a
    /// [`SharedConnection`](crate::runner::SharedConnection) with an open
    /// transaction.
    #[must_use]
    pub fn db_runner(mut self, runner: DbRunner) -> Self {
        self.prebuilt.push(Runner::Db(runner));
        self
    }

    /// Append an unnamed step.
    #[must_use]
    pub fn step(mut self, step: Value) -> Self {
        self.steps.push((None, step));
        self
    }

    /// Append a named step.
    #[must_use]
    pub fn named_step(mut self, key: impl Into<String>, step: Value) -> Self {
        self.steps.push((Some(key.into()), step));
        self
    }

    /// Delay between steps.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Print step progress to the output.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Abort a batch when this scenario fails.
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Mark the scenario as included by another one.
    #[must_use]
    pub fn included(mut self, included: bool) -> Self {
        self.included = included;
        self
    }

    /// Run the scenario only when `cond` is true.
    #[must_use]
    pub fn cond(mut self, cond: impl Into<String>) -> Self {
        self.cond = Some(cond.into());
        self
    }

    /// Write debug and `dump` output here instead of stderr.
    #[must_use]
    pub fn output(mut self, out: Output) -> Self {
        self.out = Some(out);
        self
    }

    /// Report runner traffic to `capturer`. Included books inherit it.
    #[must_use]
    pub fn capture(mut self, capturer: Arc<dyn Capturer>) -> Self {
        self.capturers.push(capturer);
        self
    }
}
