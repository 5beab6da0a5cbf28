//! Step definitions.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::runner::side::parse_bindings;
use crate::runner::{
    RunnerRef, Runners, BIND_RUNNER_KEY, DUMP_RUNNER_KEY, EXEC_RUNNER_KEY, INCLUDE_RUNNER_KEY,
    TEST_RUNNER_KEY,
};

/// The primary action of a step, bound to its runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Request payload for the HTTP runner at this registry slot.
    Http { runner: usize, request: Value },
    /// Query payload for the DB runner at this registry slot.
    Db { runner: usize, query: Value },
    /// Command payload for the exec runner.
    Exec(Value),
    /// Path of the book to include.
    Include(String),
}

impl Action {
    /// Label used in step failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http request",
            Self::Db { .. } => "db query",
            Self::Exec(_) => "exec command",
            Self::Include(_) => "include",
        }
    }
}

/// One step of a scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    /// Step name in named mode
    pub key: Option<String>,

    /// Key of the primary action as written in the book
    pub runner_key: Option<String>,

    /// Primary action
    pub action: Option<Action>,

    /// Assertion run after the primary action
    pub test: Option<String>,

    /// Expression printed after the assertion
    pub dump: Option<String>,

    /// Variables bound after the dump
    pub bind: Option<Vec<(String, String)>>,
}

fn is_side_key(k: &str) -> bool {
    k == TEST_RUNNER_KEY || k == DUMP_RUNNER_KEY || k == BIND_RUNNER_KEY
}

impl Step {
    /// Build a step from its book mapping, resolving the primary action
    /// against the runner registry.
    pub fn parse(key: Option<String>, config: &Value, runners: &Runners) -> Result<Self> {
        let map = config
            .as_object()
            .ok_or_else(|| Error::config(format!("step must be a mapping: {config}")))?;
        if map.is_empty() {
            return Err(Error::config("step must specify at least one runner"));
        }
        let primaries: Vec<(&String, &Value)> =
            map.iter().filter(|(k, _)| !is_side_key(k)).collect();
        if primaries.len() > 1 {
            return Err(Error::config(
                "runners that cannot be running at the same time are specified",
            ));
        }

        let mut step = Self { key, ..Self::default() };

        if let Some(v) = map.get(TEST_RUNNER_KEY) {
            let cond =
                v.as_str().ok_or_else(|| Error::config(format!("invalid test condition: {v}")))?;
            step.test = Some(cond.to_string());
        }
        if let Some(v) = map.get(DUMP_RUNNER_KEY) {
            let cond =
                v.as_str().ok_or_else(|| Error::config(format!("invalid dump condition: {v}")))?;
            step.dump = Some(cond.to_string());
        }
        if let Some(v) = map.get(BIND_RUNNER_KEY) {
            step.bind = Some(parse_bindings(v)?);
        }

        if let Some((k, v)) = primaries.first() {
            step.action = Some(parse_action(k, v, runners)?);
            step.runner_key = Some((*k).clone());
        }
        Ok(step)
    }
}

fn parse_action(key: &str, v: &Value, runners: &Runners) -> Result<Action> {
    match key {
        INCLUDE_RUNNER_KEY => v
            .as_str()
            .map(|p| Action::Include(p.to_string()))
            .ok_or_else(|| Error::config(format!("invalid include path: {v}"))),
        EXEC_RUNNER_KEY if v.is_object() => Ok(Action::Exec(v.clone())),
        EXEC_RUNNER_KEY => Err(Error::config(format!("invalid exec command: {v}"))),
        _ => match runners.resolve(key) {
            Some(RunnerRef::Http(runner)) if v.is_object() => {
                Ok(Action::Http { runner, request: v.clone() })
            }
            Some(RunnerRef::Http(_)) => Err(Error::config(format!("invalid http request: {v}"))),
            Some(RunnerRef::Db(runner)) if v.is_object() => {
                Ok(Action::Db { runner, query: v.clone() })
            }
            Some(RunnerRef::Db(_)) => Err(Error::config(format!("invalid db query: {v}"))),
            None => Err(Error::config(format!("can not find client: {key}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use serde_json::json;

    use super::*;
    use crate::runner::{DbRunner, HttpRunner, Runner};

    fn runners() -> Runners {
        let mut runners = Runners::new();
        let http = HttpRunner::new("req", "http://localhost:8080").unwrap();
        runners.insert(Runner::Http(http)).unwrap();
        let db = DbRunner::new("db", Connection::open_in_memory().unwrap());
        runners.insert(Runner::Db(db)).unwrap();
        runners
    }

    #[test]
    fn test_parse_db_step_with_side_runners() {
        let config = json!({
            "db": {"query": "SELECT 1"},
            "test": "steps[0].rows[0]['1'] == 1",
            "dump": "steps[0]",
            "bind": {"one": "steps[0].rows[0]['1']"}
        });
        let step = Step::parse(None, &config, &runners()).unwrap();

        assert_eq!(step.runner_key.as_deref(), Some("db"));
        let query = json!({"query": "SELECT 1"});
        assert_eq!(step.action, Some(Action::Db { runner: 0, query }));
        assert_eq!(step.test.as_deref(), Some("steps[0].rows[0]['1'] == 1"));
        assert_eq!(step.dump.as_deref(), Some("steps[0]"));
        let bind = vec![("one".to_string(), "steps[0].rows[0]['1']".to_string())];
        assert_eq!(step.bind, Some(bind));
    }

    #[test]
    fn test_parse_builtin_actions() {
        let r = runners();
        let include = Step::parse(Some("sub".into()), &json!({"include": "sub.yml"}), &r).unwrap();
        assert_eq!(include.action, Some(Action::Include("sub.yml".into())));
        assert_eq!(include.key.as_deref(), Some("sub"));

        let exec = Step::parse(None, &json!({"exec": {"command": "true"}}), &r).unwrap();
        assert!(matches!(exec.action, Some(Action::Exec(_))));

        let http = Step::parse(None, &json!({"req": {"/": {"get": null}}}), &r).unwrap();
        assert!(matches!(http.action, Some(Action::Http { runner: 0, .. })));
    }

    #[test]
    fn test_side_only_step_has_no_action() {
        let step = Step::parse(None, &json!({"test": "true"}), &runners()).unwrap();
        assert!(step.action.is_none());
        assert!(step.runner_key.is_none());
    }

    #[test]
    fn test_parse_errors() {
        let r = runners();
        let cases = [
            (json!({}), "at least one runner"),
            (json!({"db": {"query": "SELECT 1"}, "exec": {"command": "true"}}), "same time"),
            (json!({"nope": {}}), "can not find client: nope"),
            (json!({"db": "SELECT 1"}), "invalid db query"),
            (json!({"req": "/"}), "invalid http request"),
            (json!({"exec": "ls"}), "invalid exec command"),
            (json!({"include": 1}), "invalid include path"),
            (json!({"test": 1}), "invalid test condition"),
            (json!({"dump": ["x"]}), "invalid dump condition"),
            (json!({"bind": {"vars": "1"}}), "reserved"),
        ];
        for (config, want) in cases {
            let err = Step::parse(None, &config, &r).unwrap_err().to_string();
            assert!(err.contains(want), "{config}: {err}");
        }
    }
}
