//! Placeholder expansion.
//!
//! Every string scalar and mapping key in a payload is scanned for
//! `{{ expr }}`. A placeholder that makes up the whole scalar yields the
//! typed value (integer or string); placeholders inside a longer string are
//! substituted as text. Values are never re-parsed, so quotes, `#` and `: `
//! in substituted strings are kept verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::expr::{evaluate, to_display_string};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{\s*(.+?)\s*\}\}").expect("placeholder pattern is valid"));

/// Resolve every placeholder in `input` against the flattened store.
///
/// Values without any `{{` are returned as-is.
pub fn expand(input: &Value, store: &Map<String, Value>) -> Result<Value> {
    if !has_placeholder(input) {
        return Ok(input.clone());
    }
    Expander { store, root: input }.value(input)
}

struct Expander<'a> {
    store: &'a Map<String, Value>,
    root: &'a Value,
}

impl Expander<'_> {
    fn value(&self, v: &Value) -> Result<Value> {
        match v {
            Value::String(s) if s.contains("{{") => self.scalar(s),
            Value::Array(items) => {
                items.iter().map(|item| self.value(item)).collect::<Result<_>>().map(Value::Array)
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    let key = if k.contains("{{") { self.key(k)? } else { k.clone() };
                    out.insert(key, self.value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn scalar(&self, s: &str) -> Result<Value> {
        match whole_placeholder(s) {
            Some(expr) => match self.eval(expr)? {
                v @ Value::String(_) => Ok(v),
                Value::Number(n) if is_integer(&n) => Ok(Value::Number(n)),
                other => Err(self.invalid(&other)),
            },
            None => self.inline(s).map(Value::String),
        }
    }

    fn key(&self, k: &str) -> Result<String> {
        match whole_placeholder(k) {
            Some(expr) => self.render(&self.eval(expr)?),
            None => self.inline(k),
        }
    }

    fn inline(&self, s: &str) -> Result<String> {
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(s) {
            let (Some(m), Some(expr)) = (caps.get(0), caps.get(1)) else { continue };
            out.push_str(&s[last..m.start()]);
            out.push_str(&self.render(&self.eval(expr.as_str())?)?);
            last = m.end();
        }
        out.push_str(&s[last..]);
        Ok(out)
    }

    fn render(&self, value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) if is_integer(n) => Ok(n.to_string()),
            other => Err(self.invalid(other)),
        }
    }

    fn eval(&self, expr: &str) -> Result<Value> {
        evaluate(expr, self.store)
            .map_err(|source| Error::Expand { source, fragment: self.fragment() })
    }

    fn invalid(&self, value: &Value) -> Error {
        Error::InvalidFormat { value: to_display_string(value), fragment: self.fragment() }
    }

    /// The payload being expanded, as YAML, for error messages.
    fn fragment(&self) -> String {
        serde_yaml::to_string(self.root).unwrap_or_else(|_| self.root.to_string())
    }
}

/// The expression of `s` when `s` is exactly one placeholder.
fn whole_placeholder(s: &str) -> Option<&str> {
    let caps = PLACEHOLDER_RE.captures(s)?;
    let m = caps.get(0)?;
    if m.start() == 0 && m.end() == s.len() {
        caps.get(1).map(|e| e.as_str())
    } else {
        None
    }
}

fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64()
}

fn has_placeholder(v: &Value) -> bool {
    match v {
        Value::String(s) => s.contains("{{"),
        Value::Array(items) => items.iter().any(has_placeholder),
        Value::Object(map) => map.iter().any(|(k, v)| k.contains("{{") || has_placeholder(v)),
        _ => false,
    }
}
