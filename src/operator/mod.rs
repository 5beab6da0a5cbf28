//! Scenario operator.
//!
//! An [`Operator`] owns one scenario: its runners, its steps and the store
//! the steps write into. Steps run strictly in order. Each step's primary
//! action is expanded against the store, dispatched to its runner and its
//! result recorded, then the `test`, `dump` and `bind` side-runners run
//! against the updated store. The first error ends the scenario.

mod expand;
mod options;
mod step;
mod store;

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

pub use expand::expand;
pub use options::{output, Options, Output};
pub use step::{Action, Step};
pub use store::{Store, STORE_INCLUDED_KEY, STORE_STEPS_KEY, STORE_VARS_KEY};

use crate::book::{discover_books, parse_book, Book};
use crate::capture::{Capturer, Capturers, Debugger};
use crate::error::{Error, Result};
use crate::expr::evaluate_condition;
use crate::result::{RunNResult, RunResult, StepResult};
use crate::runner::side::{run_bind, run_dump, run_test};
use crate::runner::{
    run_blocking, DbQuery, ExecCommand, ExecRunner, HttpRequest, HttpRunner, Runner, Runners,
    BIND_RUNNER_KEY, DUMP_RUNNER_KEY, RESERVED_RUNNER_NAMES, TEST_RUNNER_KEY,
};

/// Runs one scenario.
pub struct Operator {
    desc: String,
    path: Option<PathBuf>,
    root: PathBuf,
    runners: Runners,
    exec: ExecRunner,
    steps: Vec<Step>,
    store: Store,
    debug: bool,
    interval: Duration,
    fail_fast: bool,
    included: bool,
    cond: Option<String>,
    skipped: bool,
    out: Output,
    capturers: Capturers,
    capture: Arc<dyn Capturer>,
    result: RunResult,
}

impl Operator {
    /// Build an operator from a book and/or inline options.
    ///
    /// Runner definitions are all attempted before failing so that every
    /// broken runner is reported at once. Steps are resolved against the
    /// runners here; nothing is sent anywhere until [`Operator::run`].
    pub fn new(opts: Options) -> Result<Self> {
        let mut book = match &opts.book {
            Some(path) => parse_book(path)?,
            None => Book::default(),
        };
        let parent = book.path.as_deref().and_then(Path::parent);
        let root = match parent.filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let interval = match opts.interval {
            Some(interval) => interval,
            None => book.interval()?,
        };

        let mut defs = std::mem::take(&mut book.runners);
        for (name, dsn) in opts.runners {
            defs.insert(name, Value::String(dsn));
        }
        for runner in &opts.prebuilt {
            defs.remove(runner.name());
        }

        let mut runners = Runners::new();
        let mut errors = Vec::new();
        for (name, def) in &defs {
            if RESERVED_RUNNER_NAMES.contains(&name.as_str()) {
                return Err(Error::config(format!(
                    "runner name '{name}' is reserved for built-in runner"
                )));
            }
            match build_runner(name, def) {
                Ok(runner) => {
                    runners.insert(runner)?;
                }
                Err(e) => errors.push(format!("runner {name} error: {e}")),
            }
        }
        for runner in opts.prebuilt {
            runners.insert(runner)?;
        }
        if !errors.is_empty() {
            return Err(Error::Runners(errors));
        }

        let desc = opts.desc.unwrap_or(book.desc);
        let mut vars = book.vars;
        vars.extend(opts.vars);

        let mut entries = book.steps.entries();
        entries.extend(opts.steps);
        let named = !entries.is_empty() && entries.iter().all(|(key, _)| key.is_some());
        let store = if named {
            let keys: Vec<String> = entries.iter().filter_map(|(key, _)| key.clone()).collect();
            for (i, key) in keys.iter().enumerate() {
                if keys[..i].contains(key) {
                    return Err(Error::config(format!("duplicate step name: {key}")));
                }
            }
            Store::named(vars, keys)
        } else {
            if entries.iter().any(|(key, _)| key.is_some()) {
                tracing::debug!(desc = %desc, "Not every step is named, recording by position");
            }
            Store::positional(vars)
        };

        let mut steps = Vec::with_capacity(entries.len());
        for (i, (key, config)) in entries.into_iter().enumerate() {
            let key = key.filter(|_| named);
            let at = step_name(&desc, i, key.as_deref());
            let step = Step::parse(key, &config, &runners).map_err(|e| match e {
                Error::Config(msg) => Error::config(format!("invalid {at}: {msg}")),
                other => other,
            })?;
            steps.push(step);
        }

        let debug = book.debug || opts.debug;
        let out = opts.out.unwrap_or_else(|| output(std::io::stderr()));
        let mut capture = opts.capturers.clone();
        if debug {
            capture.push(Arc::new(Debugger::new(out.clone())));
        }

        Ok(Self {
            result: RunResult::new(desc.clone(), book.path.clone()),
            desc,
            path: book.path,
            exec: ExecRunner::new(Some(root.clone())),
            root,
            runners,
            steps,
            store,
            debug,
            interval,
            fail_fast: opts.fail_fast,
            included: opts.included,
            cond: opts.cond.or(book.cond),
            skipped: false,
            out,
            capturers: opts.capturers,
            capture: Arc::new(capture),
        })
    }

    /// Scenario description.
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Book the scenario was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Parsed steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Current store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Whether the last run was skipped by the scenario guard.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// Whether a failure of this scenario aborts a batch.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Result of the last run.
    pub fn result(&self) -> &RunResult {
        &self.result
    }

    /// Run the scenario.
    ///
    /// Returns the first step error. A scenario skipped by its guard is not
    /// an error; see [`Operator::skipped`]. The store keeps its contents
    /// between runs, so an operator is meant to run once.
    pub async fn run(&mut self) -> Result<()> {
        self.result = RunResult::new(self.desc.clone(), self.path.clone());
        self.skipped = false;

        let outcome = self.run_steps().await;

        for i in self.result.step_results.len()..self.steps.len() {
            let key = self.step_key(i);
            self.result.step_results.push(StepResult { key, skipped: true, err: None });
        }
        self.result.skipped = self.skipped;
        self.result.store = self.store.to_map();
        if let Err(e) = &outcome {
            self.result.err = Some(e.to_string());
        }
        outcome
    }

    async fn run_steps(&mut self) -> Result<()> {
        if let Some(cond) = &self.cond {
            let mut env = self.store.to_map();
            env.insert(STORE_INCLUDED_KEY.to_string(), Value::Bool(self.included));
            if !evaluate_condition(cond, &env)? {
                self.debugf(format!("Skip {}", self.desc).yellow());
                tracing::debug!(desc = %self.desc, "Scenario skipped by guard");
                self.skipped = true;
                return Ok(());
            }
        }

        for i in 0..self.steps.len() {
            if i != 0 {
                if !self.interval.is_zero() {
                    tokio::time::sleep(self.interval).await;
                }
                self.debugf("");
            }
            let key = self.step_key(i);
            match self.run_step(i).await {
                Ok(()) => {
                    self.result.step_results.push(StepResult { key, skipped: false, err: None });
                }
                Err(e) => {
                    let err = Some(e.to_string());
                    self.result.step_results.push(StepResult { key, skipped: false, err });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn run_step(&mut self, i: usize) -> Result<()> {
        let step = self.steps[i].clone();
        let name = self.step_name(i);

        if let (Some(action), Some(key)) = (&step.action, &step.runner_key) {
            self.debugf(format!("Run '{key}' on {name}").cyan());
            tracing::debug!(step = %name, runner = %key, "Running step");
            let value =
                self.run_action(action).await.map_err(|e| e.on_step(action.label(), &name))?;
            self.store.record(value);
        }

        if let Some(cond) = &step.test {
            self.debugf(format!("Run '{TEST_RUNNER_KEY}' on {name}").cyan());
            run_test(cond, &self.store.to_map()).map_err(|e| e.on_step("test", &name))?;
            self.fill_slot(i);
        }

        if let Some(expr) = &step.dump {
            self.debugf(format!("Run '{DUMP_RUNNER_KEY}' on {name}").cyan());
            let env = self.store.to_map();
            run_dump(expr, &env, &mut **self.out.lock()).map_err(|e| e.on_step("dump", &name))?;
            self.fill_slot(i);
        }

        if let Some(bindings) = &step.bind {
            self.debugf(format!("Run '{BIND_RUNNER_KEY}' on {name}").cyan());
            let bound =
                run_bind(bindings, &self.store.to_map()).map_err(|e| e.on_step("bind", &name))?;
            for (k, v) in bound {
                self.store.bind(k, v);
            }
            self.fill_slot(i);
        }

        Ok(())
    }

    async fn run_action(&mut self, action: &Action) -> Result<Value> {
        let env = self.store.to_map();
        match action {
            Action::Http { runner, request } => {
                let request = HttpRequest::from_value(&expand(request, &env)?)?;
                let runner = self.runners.http(*runner).clone();
                runner.run(&request).await
            }
            Action::Db { runner, query } => {
                let query = DbQuery::from_value(&expand(query, &env)?)?;
                Ok(run_blocking(self.runners.db(*runner), query, self.capture.clone()).await?)
            }
            Action::Exec(command) => {
                let command = ExecCommand::from_value(&expand(command, &env)?)?;
                let exec = self.exec.clone();
                exec.run(&command).await
            }
            Action::Include(path) => {
                let opts = Options { capturers: self.capturers.clone(), ..Options::default() }
                    .included(true)
                    .debug(self.debug)
                    .output(self.out.clone());
                include(self.root.join(path), opts).await
            }
        }
    }

    /// Keep `steps[i]` addressable when a step recorded nothing itself.
    fn fill_slot(&mut self, i: usize) {
        if self.store.len() < i + 1 {
            self.store.record(Value::Null);
        }
    }

    fn step_key(&self, i: usize) -> String {
        match &self.steps[i].key {
            Some(key) => key.clone(),
            None => i.to_string(),
        }
    }

    fn step_name(&self, i: usize) -> String {
        step_name(&self.desc, i, self.steps[i].key.as_deref())
    }

    fn debugf(&self, msg: impl Display) {
        if self.debug {
            let _ = writeln!(self.out.lock(), "{msg}");
        }
    }
}

fn step_name(desc: &str, i: usize, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("'{desc}'.steps.{key}"),
        None => format!("'{desc}'.steps[{i}]"),
    }
}

fn build_runner(name: &str, def: &Value) -> Result<Runner> {
    match def {
        Value::String(dsn) => Runner::from_dsn(name, dsn),
        Value::Object(m) => match m.get("endpoint").and_then(Value::as_str) {
            Some(endpoint) => Ok(Runner::Http(HttpRunner::new(name, endpoint)?)),
            None => Err(Error::config(format!("invalid runner definition: {def}"))),
        },
        other => Err(Error::config(format!("invalid runner definition: {other}"))),
    }
}

/// Run another book as a child scenario and return its flattened store.
fn include(path: PathBuf, opts: Options) -> BoxFuture<'static, Result<Value>> {
    async move {
        tracing::debug!(path = %path.display(), "Including book");
        let mut child = Operator::new(opts.book(path))?;
        child.run().await?;
        Ok(Value::Object(child.store.to_map()))
    }
    .boxed()
}

/// A batch of scenarios.
pub struct Operators {
    ops: Vec<Operator>,
    result: RunNResult,
}

impl Operators {
    /// Wrap already built operators.
    pub fn new(ops: Vec<Operator>) -> Self {
        Self { ops, result: RunNResult::new() }
    }

    /// Build one operator per book found under `paths`, each starting from
    /// the options returned by `options`.
    pub fn load(paths: &[PathBuf], mut options: impl FnMut() -> Options) -> Result<Self> {
        let ops = discover_books(paths)?
            .into_iter()
            .map(|book| Operator::new(options().book(book)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ops))
    }

    /// Operators in run order.
    pub fn operators(&self) -> &[Operator] {
        &self.ops
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Results of the last [`Operators::run_n`].
    pub fn result(&self) -> &RunNResult {
        &self.result
    }

    /// Run every scenario in order.
    ///
    /// A failing scenario only stops the batch when it was built with
    /// `fail_fast`; otherwise the failure is recorded and the next scenario
    /// runs.
    pub async fn run_n(&mut self) -> Result<()> {
        self.result = RunNResult::new();
        self.result.set_total(i64::try_from(self.ops.len()).unwrap_or(i64::MAX));

        for op in &mut self.ops {
            let outcome = op.run().await;
            self.result.push(op.result().clone());
            if let Err(e) = outcome {
                if op.fail_fast {
                    return Err(e);
                }
                tracing::warn!(desc = %op.desc, error = %e, "Scenario failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use parking_lot::Mutex;
    use rusqlite::Connection;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::runner::{DbRunner, SharedConnection};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    fn db_options(desc: &str) -> Options {
        Options::new().desc(desc).runner("db", "sqlite://:memory:")
    }

    #[tokio::test]
    async fn test_positional_db_flow() {
        let mut op = Operator::new(
            db_options("users")
                .var("name", json!("alice"))
                .step(json!({"db": {"query": "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL
                );"}}))
                .step(json!({
                    "db": {"query": "INSERT INTO users (name) VALUES ('{{ vars.name }}');"}
                }))
                .step(json!({
                    "db": {
                        "query": "SELECT id, name FROM users \
                                  WHERE id = {{ steps[1].last_insert_id }};"
                    },
                    "test": "steps[2].rows[0].name == vars.name",
                    "bind": {"user_id": "steps[2].rows[0].id"}
                }))
                .step(json!({"test": "user_id == 1"})),
        )
        .unwrap();

        op.run().await.unwrap();

        assert!(!op.store().is_named());
        let store = op.store().to_map();
        assert_eq!(store["steps"][1], json!({"last_insert_id": 1, "rows_affected": 1}));
        assert_eq!(store["steps"][2], json!({"rows": [{"id": 1, "name": "alice"}]}));
        assert_eq!(store["steps"][3], Value::Null);
        assert_eq!(store["user_id"], json!(1));
        assert_eq!(op.result().step_results.len(), 4);
        assert!(op.result().err.is_none());
    }

    #[tokio::test]
    async fn test_named_steps() {
        let mut op = Operator::new(
            db_options("named")
                .named_step("one", json!({"db": {"query": "SELECT 1 AS n;"}}))
                .named_step("check", json!({"test": "steps.one.rows[0].n == 2"})),
        )
        .unwrap();

        assert!(op.store().is_named());
        let err = op.run().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "test failed on 'named'.steps.check: (steps.one.rows[0].n == 2) is not true"
        );
        assert_eq!(op.store().to_map()["steps"], json!({"one": {"rows": [{"n": 1}]}}));
        assert_eq!(op.result().step_results[1].key, "check");
    }

    #[tokio::test]
    async fn test_partially_named_steps_fall_back_to_positional() {
        let mut op = Operator::new(
            db_options("mixed")
                .named_step("one", json!({"db": {"query": "SELECT 1 AS n;"}}))
                .step(json!({"test": "steps[0].rows[0].n == 1"}))
                .step(json!({"test": "steps[1] == nil && false"})),
        )
        .unwrap();

        assert!(!op.store().is_named());
        assert!(op.steps().iter().all(|s| s.key.is_none()));
        let err = op.run().await.unwrap_err();
        assert!(err.to_string().starts_with("test failed on 'mixed'.steps[2]:"));
    }

    #[tokio::test]
    async fn test_duplicate_step_names_rejected() {
        let err = Operator::new(
            Options::new()
                .named_step("a", json!({"test": "true"}))
                .named_step("a", json!({"test": "true"})),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("duplicate step name: a"));
    }

    #[tokio::test]
    async fn test_failure_stops_scenario_and_marks_rest_skipped() {
        let mut op = Operator::new(
            db_options("stop")
                .step(json!({"db": {"query": "SELECT 1 AS n;"}}))
                .step(json!({"db": {"query": "SELECT * FROM missing;"}}))
                .step(json!({"db": {"query": "SELECT 2 AS n;"}})),
        )
        .unwrap();

        let err = op.run().await.unwrap_err();
        assert!(err.to_string().starts_with("db query failed on 'stop'.steps[1]:"));
        assert_eq!(op.store().len(), 1);

        let results = &op.result().step_results;
        assert!(results[0].err.is_none() && !results[0].skipped);
        assert!(results[1].err.is_some());
        assert!(results[2].skipped);
        assert!(op.result().err.is_some());
    }

    #[tokio::test]
    async fn test_guard_skips_scenario() {
        let mut op = Operator::new(
            db_options("guarded").cond("included").step(json!({"db": {"query": "SELECT 1;"}})),
        )
        .unwrap();
        op.run().await.unwrap();
        assert!(op.skipped());
        assert!(op.store().is_empty());
        assert!(op.result().skipped);
        assert!(op.result().step_results[0].skipped);

        let mut op = Operator::new(
            db_options("guarded")
                .cond("included && vars.go == 'yes'")
                .included(true)
                .var("go", json!("yes"))
                .step(json!({"db": {"query": "SELECT 1;"}})),
        )
        .unwrap();
        op.run().await.unwrap();
        assert!(!op.skipped());
        assert_eq!(op.store().len(), 1);
    }

    #[tokio::test]
    async fn test_dump_and_debug_output() {
        let buf = Buffer::default();
        let mut op = Operator::new(
            db_options("dump")
                .debug(true)
                .output(output(buf.clone()))
                .step(json!({
                    "db": {"query": "SELECT 'hello' AS greeting;"},
                    "dump": "steps[0].rows[0].greeting"
                })),
        )
        .unwrap();

        op.run().await.unwrap();
        let text = buf.text();
        assert!(text.contains("Run 'db' on 'dump'.steps[0]"));
        assert!(text.contains("-----START QUERY (db)-----\nSELECT 'hello' AS greeting;\n"));
        assert!(text.contains("greeting\nhello\n(1 rows)\n"));
        assert!(text.contains("Run 'dump' on 'dump'.steps[0]"));
        assert!(text.contains("hello\n"));
    }

    #[derive(Default)]
    struct Columns(Mutex<Vec<Vec<String>>>);

    impl Capturer for Columns {
        fn capture_db_response(&self, _runner: &str, response: &crate::runner::DbResponse) {
            if let crate::runner::DbResponse::Query { columns, .. } = response {
                self.0.lock().push(columns.clone());
            }
        }
    }

    #[tokio::test]
    async fn test_capturer_sees_columns_of_included_books() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("child.yml"),
            "desc: child\nrunners:\n  db: sqlite://:memory:\nsteps:\n  \
             - db:\n      query: SELECT 1 AS inner_n;\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("parent.yml"),
            "desc: parent\nrunners:\n  db: sqlite://:memory:\nsteps:\n  \
             - db:\n      query: SELECT 1 AS a, 2 AS b;\n  - include: child.yml\n",
        )
        .unwrap();

        let columns = Arc::new(Columns::default());
        let mut op = Operator::new(
            Options::new().book(dir.path().join("parent.yml")).capture(columns.clone()),
        )
        .unwrap();
        op.run().await.unwrap();

        assert_eq!(
            *columns.0.lock(),
            vec![vec!["a".to_string(), "b".to_string()], vec!["inner_n".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_http_step_sends_expanded_header() {
        let (url, server) =
            crate::runner::http_stub::serve_once("application/json", r#"{"ok":true}"#).await;
        let mut op = Operator::new(
            Options::new()
                .desc("http")
                .runner("api", url)
                .var("token", json!("abc"))
                .step(json!({
                    "api": {"/things": {"get": {"headers": {"X-Token": "{{ vars.token }}"}}}},
                    "test": "steps[0].res.status == 200 && steps[0].res.body.ok == true"
                })),
        )
        .unwrap();

        op.run().await.unwrap();
        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /things http/1.1"));
        assert!(request.contains("x-token: abc"));
    }

    #[tokio::test]
    async fn test_expansion_error_is_reported_on_step() {
        let mut op = Operator::new(
            db_options("expand")
                .step(json!({"db": {"query": "SELECT {{ vars.ratio }};"}}))
                .var("ratio", json!(0.5)),
        )
        .unwrap();
        let err = op.run().await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("db query failed on 'expand'.steps[0]: invalid format: 0.5"));
    }

    #[tokio::test]
    async fn test_runner_configuration_errors() {
        let err = Operator::new(Options::new().runner("exec", "sqlite://:memory:")).err().unwrap();
        assert!(err.to_string().contains("reserved for built-in runner"));

        let err =
            Operator::new(Options::new().runner("a", "mysql://x/y").runner("b", "oracle://x/y"))
                .err()
                .unwrap();
        match err {
            Error::Runners(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("runner a error:"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = Operator::new(db_options("x").step(json!({"nope": {"query": "SELECT 1"}})))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid 'x'.steps[0]: can not find client: nope"
        );

        let err = Operator::new(
            Options::new()
                .http_runner(HttpRunner::new("api", "http://localhost").unwrap())
                .db_runner(DbRunner::new("api", Connection::open_in_memory().unwrap())),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("duplicate runner names: api"));
    }

    #[tokio::test]
    async fn test_nested_transaction_is_transparent() {
        let script = json!({"db": {"query": "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT); \
            INSERT INTO t (v) VALUES ('a'); SELECT v FROM t;"}});

        let mut fresh = Operator::new(db_options("tx").step(script.clone())).unwrap();
        fresh.run().await.unwrap();

        let shared = SharedConnection::new(Connection::open_in_memory().unwrap());
        shared.lock().execute_batch("BEGIN").unwrap();
        let mut nested = Operator::new(
            Options::new().desc("tx").db_runner(DbRunner::new("db", shared.clone())).step(script),
        )
        .unwrap();
        nested.run().await.unwrap();

        assert_eq!(fresh.store().to_map(), nested.store().to_map());

        shared.lock().execute_batch("ROLLBACK").unwrap();
        let conn = shared.lock();
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_step_and_interval() {
        let mut op = Operator::new(
            Options::new()
                .desc("exec")
                .interval(Duration::from_millis(50))
                .var("word", json!("ping"))
                .step(json!({"exec": {"command": "echo {{ vars.word }}"}}))
                .step(json!({"exec": {"command": "cat", "stdin": "{{ steps[0].stdout }}"}}))
                .step(json!({"test": "steps[1].stdout == 'ping' && steps[1].exit_code == 0"})),
        )
        .unwrap();

        let started = Instant::now();
        op.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_include_records_child_store() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("child.yml"),
            "desc: child\nif: included\nrunners:\n  db: sqlite://:memory:\nsteps:\n  \
             - db:\n      query: SELECT 7 AS n;\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("parent.yml"),
            "desc: parent\nsteps:\n  - include: child.yml\n  \
             - test: steps[0].steps[0].rows[0].n == 7\n",
        )
        .unwrap();

        let mut parent = Operator::new(Options::new().book(dir.path().join("parent.yml"))).unwrap();
        parent.run().await.unwrap();
        assert_eq!(parent.store().len(), 2);

        let mut child = Operator::new(Options::new().book(dir.path().join("child.yml"))).unwrap();
        child.run().await.unwrap();
        assert!(child.skipped());
    }

    #[tokio::test]
    async fn test_include_failure_fails_step() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("parent.yml"),
            "desc: parent\nsteps:\n  - include: missing.yml\n",
        )
        .unwrap();

        let mut parent = Operator::new(Options::new().book(dir.path().join("parent.yml"))).unwrap();
        let err = parent.run().await.unwrap_err();
        assert!(err.to_string().starts_with("include failed on 'parent'.steps[0]: Book not found"));
    }

    #[tokio::test]
    async fn test_run_n_continues_without_fail_fast() {
        let failing = || db_options("bad").step(json!({"test": "false"}));
        let passing = || db_options("good").step(json!({"test": "true"}));

        let mut ops = Operators::new(vec![
            Operator::new(failing()).unwrap(),
            Operator::new(passing()).unwrap(),
        ]);
        ops.run_n().await.unwrap();
        let summary = ops.result().simplify();
        assert_eq!((summary.total, summary.success, summary.failure), (2, 1, 1));

        let mut ops = Operators::new(vec![
            Operator::new(failing().fail_fast(true)).unwrap(),
            Operator::new(passing()).unwrap(),
        ]);
        assert!(ops.run_n().await.is_err());
        assert_eq!(ops.result().run_results().len(), 1);
    }

    #[tokio::test]
    async fn test_load_books_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yml"), "desc: a\nsteps:\n  - test: vars.n == 1\n")
            .unwrap();
        std::fs::write(dir.path().join("b.yaml"), "desc: b\nsteps:\n  - test: vars.n == 2\n")
            .unwrap();

        let mut ops =
            Operators::load(&[dir.path().to_path_buf()], || Options::new().var("n", json!(1)))
                .unwrap();
        assert_eq!(ops.len(), 2);
        ops.run_n().await.unwrap();
        assert!(ops.result().has_failure());
        assert_eq!(ops.result().simplify().success, 1);
    }
}
