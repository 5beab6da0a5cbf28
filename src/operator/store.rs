//! Scenario store.

use serde_json::{Map, Value};

/// Store key of the seed variables.
pub const STORE_VARS_KEY: &str = "vars";
/// Store key of the step results.
pub const STORE_STEPS_KEY: &str = "steps";
/// Store key of the included flag, visible to the scenario guard.
pub const STORE_INCLUDED_KEY: &str = "included";

/// Step results, either by position or by step name.
#[derive(Debug, Clone, PartialEq)]
enum Slots {
    Positional(Vec<Value>),
    Named { keys: Vec<String>, values: Map<String, Value> },
}

/// Accumulated state of one scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    vars: Map<String, Value>,
    steps: Slots,
    bind_vars: Map<String, Value>,
}

impl Store {
    /// A store that records step results positionally.
    pub fn positional(vars: Map<String, Value>) -> Self {
        Self { vars, steps: Slots::Positional(Vec::new()), bind_vars: Map::new() }
    }

    /// A store that records the n-th result under `keys[n]`.
    pub fn named(vars: Map<String, Value>, keys: Vec<String>) -> Self {
        Self { vars, steps: Slots::Named { keys, values: Map::new() }, bind_vars: Map::new() }
    }

    /// Whether results are recorded by step name.
    pub fn is_named(&self) -> bool {
        matches!(self.steps, Slots::Named { .. })
    }

    /// Record the result of the next step.
    pub fn record(&mut self, value: Value) {
        match &mut self.steps {
            Slots::Positional(steps) => steps.push(value),
            Slots::Named { keys, values } => {
                if let Some(key) = keys.get(values.len()) {
                    values.insert(key.clone(), value);
                } else {
                    tracing::warn!("Dropping result recorded past the last named step");
                }
            }
        }
    }

    /// Number of recorded step results.
    pub fn len(&self) -> usize {
        match &self.steps {
            Slots::Positional(steps) => steps.len(),
            Slots::Named { values, .. } => values.len(),
        }
    }

    /// Whether no step result has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind a variable; visible at the top level of the flattened view.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bind_vars.insert(name.into(), value);
    }

    /// Seed variables.
    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// Recorded step results as a sequence or a mapping.
    pub fn steps(&self) -> Value {
        match &self.steps {
            Slots::Positional(steps) => Value::Array(steps.clone()),
            Slots::Named { values, .. } => Value::Object(values.clone()),
        }
    }

    /// Flattened view used by expressions: `vars`, `steps` and every bound
    /// variable at the top level.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut store = Map::new();
        store.insert(STORE_VARS_KEY.to_string(), Value::Object(self.vars.clone()));
        store.insert(STORE_STEPS_KEY.to_string(), self.steps());
        for (k, v) in &self.bind_vars {
            store.insert(k.clone(), v.clone());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars() -> Map<String, Value> {
        json!({"user": "alice"}).as_object().unwrap().clone()
    }

    #[test]
    fn test_positional_store() {
        let mut store = Store::positional(vars());
        assert!(store.is_empty());
        store.record(json!({"rows": []}));
        store.record(Value::Null);
        store.bind("token", json!("abc"));

        assert!(!store.is_named());
        assert_eq!(store.len(), 2);
        assert_eq!(
            Value::Object(store.to_map()),
            json!({"vars": {"user": "alice"}, "steps": [{"rows": []}, null], "token": "abc"})
        );
    }

    #[test]
    fn test_named_store_uses_declared_keys() {
        let mut store = Store::named(vars(), vec!["login".into(), "check".into()]);
        store.record(json!({"res": {"status": 200}}));

        assert!(store.is_named());
        assert_eq!(store.len(), 1);
        assert_eq!(store.steps(), json!({"login": {"res": {"status": 200}}}));

        store.record(Value::Null);
        store.record(json!("overflow"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.to_map()["steps"]["check"], Value::Null);
    }
}
