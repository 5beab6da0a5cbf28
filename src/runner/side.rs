//! Side-runners: `test`, `dump` and `bind`.
//!
//! They run after a step's primary action, in that order, against the
//! flattened store. None of them produce a value of their own.

use std::io::Write;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::expr::{evaluate, evaluate_condition, to_display_string, validate};

/// Names a bind runner may not assign.
pub const RESERVED_BIND_NAMES: &[&str] = &["vars", "steps", "included", "string"];

/// Evaluate an assertion; anything other than `true` fails.
pub fn run_test(cond: &str, env: &Map<String, Value>) -> Result<()> {
    if evaluate_condition(cond, env)? {
        Ok(())
    } else {
        Err(Error::Assertion { cond: cond.to_string() })
    }
}

/// Evaluate an expression and print its value.
pub fn run_dump(expr: &str, env: &Map<String, Value>, out: &mut dyn Write) -> Result<()> {
    let value = evaluate(expr, env)?;
    let rendered = match &value {
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(&value)?,
        other => to_display_string(other),
    };
    writeln!(out, "{rendered}")?;
    Ok(())
}

/// Parse a bind mapping of `name: expression` pairs.
pub fn parse_bindings(v: &Value) -> Result<Vec<(String, String)>> {
    let map = v
        .as_object()
        .ok_or_else(|| Error::config(format!("invalid bind condition: {v}")))?;
    let mut bindings = Vec::with_capacity(map.len());
    for (name, expr) in map {
        if RESERVED_BIND_NAMES.contains(&name.as_str()) {
            return Err(Error::config(format!("'{name}' is reserved")));
        }
        let expr = expr
            .as_str()
            .ok_or_else(|| Error::config(format!("invalid bind expression for '{name}': {expr}")))?;
        validate(expr)
            .map_err(|e| Error::config(format!("invalid bind expression for '{name}': {e}")))?;
        bindings.push((name.clone(), expr.to_string()));
    }
    Ok(bindings)
}

/// Evaluate every binding against the same store snapshot.
pub fn run_bind(
    bindings: &[(String, String)],
    env: &Map<String, Value>,
) -> Result<Vec<(String, Value)>> {
    bindings
        .iter()
        .map(|(name, expr)| Ok((name.clone(), evaluate(expr, env)?)))
        .collect()
}
