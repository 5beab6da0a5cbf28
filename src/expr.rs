//! Expression evaluation on top of minijinja.
//!
//! Expressions are evaluated against the scenario store and are used by
//! placeholder expansion, scenario guards and the `test`/`dump`/`bind`
//! side-runners. The grammar is minijinja's expression grammar plus the
//! `&&`, `||` and `!` spellings of `and`, `or` and `not`.
//!
//! ```text
//! steps[0].rows[0].count == 1 && vars.name is startingwith 'al'
//! 'some' if len(steps.login.res.body.items) > 0 else 'none'
//! string(vars.id)
//! ```

use std::borrow::Cow;

use minijinja::{Environment, Error as EngineError, ErrorKind, Value as EngineValue};
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExprError {
    /// Malformed expression source.
    #[error("syntax error in '{src}': {source}")]
    Syntax { src: String, source: EngineError },

    /// Evaluation failed (undefined member, unknown function, bad operand).
    #[error("{source}")]
    Eval { src: String, source: EngineError },

    /// The result has no JSON representation.
    #[error("unrepresentable result: {0}")]
    Value(#[from] serde_json::Error),
}

/// Build the evaluation environment with the builtin functions.
fn create_env<'s>() -> Environment<'s> {
    let mut env = Environment::new();
    env.add_global("nil", EngineValue::from(()));
    env.add_global("null", EngineValue::from(()));
    env.add_function("string", string);
    env.add_function("len", len);
    env.add_function("int", int);
    env.add_function("float", float);
    env.add_function("matches", matches_pattern);
    env
}

/// Evaluate `src` against `env` and return the result as JSON.
pub fn evaluate(src: &str, env: &Map<String, Value>) -> Result<Value, ExprError> {
    let normalized = normalize_operators(src);
    let engine = create_env();
    let expr = engine
        .compile_expression(&normalized)
        .map_err(|source| ExprError::Syntax { src: src.to_string(), source })?;
    let value = expr.eval(env).map_err(|source| ExprError::Eval { src: src.to_string(), source })?;
    Ok(serde_json::to_value(&value)?)
}

/// Evaluate `src` as a condition: true only when it yields boolean `true`.
pub fn evaluate_condition(src: &str, env: &Map<String, Value>) -> Result<bool, ExprError> {
    Ok(matches!(evaluate(src, env)?, Value::Bool(true)))
}

/// Check that `src` compiles without evaluating it.
pub fn validate(src: &str) -> Result<(), ExprError> {
    let normalized = normalize_operators(src);
    let engine = create_env();
    engine
        .compile_expression(&normalized)
        .map(|_| ())
        .map_err(|source| ExprError::Syntax { src: src.to_string(), source })
}

/// Render a value for text output: strings raw, nil as `<nil>`, the rest as JSON.
pub fn to_display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "<nil>".to_string(),
        other => other.to_string(),
    }
}

/// Rewrite `&&`, `||` and a lone `!` to keywords, leaving string literals alone.
fn normalize_operators(src: &str) -> Cow<'_, str> {
    if !src.contains(['&', '|', '!']) {
        return Cow::Borrowed(src);
    }

    let mut out = String::with_capacity(src.len() + 8);
    let mut quote: Option<char> = None;
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                out.push_str(" and ");
            }
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                out.push_str(" or ");
            }
            '!' if chars.peek() != Some(&'=') => out.push_str(" not "),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn invalid(msg: String) -> EngineError {
    EngineError::new(ErrorKind::InvalidOperation, msg)
}

fn to_json(v: &EngineValue) -> Result<Value, EngineError> {
    serde_json::to_value(v).map_err(|e| invalid(e.to_string()))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn string(v: EngineValue) -> Result<String, EngineError> {
    if let Some(s) = v.as_str() {
        return Ok(s.to_string());
    }
    Ok(to_display_string(&to_json(&v)?))
}

fn len(v: EngineValue) -> Result<EngineValue, EngineError> {
    match v.len() {
        Some(n) => Ok(EngineValue::from(n)),
        None => Err(invalid(format!("invalid argument for len: {}", type_name(&to_json(&v)?)))),
    }
}

fn int(v: EngineValue) -> Result<EngineValue, EngineError> {
    let json = to_json(&v)?;
    let n = match &json {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    n.map(EngineValue::from)
        .ok_or_else(|| invalid(format!("cannot convert {} to int", type_name(&json))))
}

fn float(v: EngineValue) -> Result<EngineValue, EngineError> {
    let json = to_json(&v)?;
    let n = match &json {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.map(EngineValue::from)
        .ok_or_else(|| invalid(format!("cannot convert {} to float", type_name(&json))))
}

fn matches_pattern(s: String, pattern: String) -> Result<bool, EngineError> {
    let re = Regex::new(&pattern).map_err(|e| invalid(format!("invalid regex: {e}")))?;
    Ok(re.is_match(&s))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> Map<String, Value> {
        json!({
            "vars": {"name": "alice", "id": 7, "ratio": 1.5, "flag": 1, "tags": ["a", "b"]},
            "steps": [{"rows": [{"n": 1, "email": "a@example.com"}]}],
            "included": false
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_member_and_index_access() {
        let env = store();
        assert_eq!(evaluate("steps[0].rows[0].email", &env).unwrap(), json!("a@example.com"));
        assert_eq!(evaluate("vars['name']", &env).unwrap(), json!("alice"));
        assert_eq!(evaluate("vars.tags[1]", &env).unwrap(), json!("b"));
    }

    #[test]
    fn test_logical_operator_spellings() {
        let env = store();
        assert!(evaluate_condition("vars.id == 7 && vars.name == 'alice'", &env).unwrap());
        assert!(evaluate_condition("vars.id == 8 || vars.name == 'alice'", &env).unwrap());
        assert!(evaluate_condition("!included", &env).unwrap());
        assert!(evaluate_condition("vars.id != 8 and not included", &env).unwrap());
    }

    #[test]
    fn test_operators_inside_strings_untouched() {
        let env = store();
        assert_eq!(evaluate("'a && b || !c'", &env).unwrap(), json!("a && b || !c"));
    }

    #[test]
    fn test_builtin_functions() {
        let env = store();
        assert_eq!(evaluate("string(vars.id)", &env).unwrap(), json!("7"));
        assert_eq!(evaluate("len(vars.tags)", &env).unwrap(), json!(2));
        assert_eq!(evaluate("len(vars.name)", &env).unwrap(), json!(5));
        assert_eq!(evaluate("int('42')", &env).unwrap(), json!(42));
        assert_eq!(evaluate("int(vars.ratio)", &env).unwrap(), json!(1));
        assert_eq!(evaluate("float('2.5')", &env).unwrap(), json!(2.5));
        assert!(evaluate_condition("matches(vars.name, '^al')", &env).unwrap());
        assert!(evaluate_condition("vars.name is startingwith 'al'", &env).unwrap());
        assert!(evaluate_condition("'a' in vars.tags", &env).unwrap());
    }

    #[test]
    fn test_nil_comparisons() {
        let env = store();
        assert!(evaluate_condition("vars.missing is undefined", &env).unwrap());
        assert!(evaluate_condition("steps[0] != null", &env).unwrap());
        assert!(evaluate_condition("nil is none", &env).unwrap());
        assert_eq!(evaluate("vars.missing", &env).unwrap(), Value::Null);
    }

    #[test]
    fn test_evaluate_condition_requires_true() {
        let env = store();
        assert!(evaluate_condition("vars.flag == 1", &env).unwrap());
        assert!(!evaluate_condition("vars.flag", &env).unwrap());
        assert!(!evaluate_condition("vars.missing", &env).unwrap());
    }

    #[test]
    fn test_syntax_error_reported() {
        let env = Map::new();
        let err = evaluate("1 +", &env).unwrap_err();
        assert!(matches!(err, ExprError::Syntax { .. }));
        assert!(validate("1 +").is_err());
        assert!(validate("steps[0].rows[0].n == 1 && !included").is_ok());
    }

    #[test]
    fn test_evaluation_errors_reported() {
        let env = store();
        assert!(matches!(evaluate("nope(1)", &env), Err(ExprError::Eval { .. })));
        assert!(matches!(evaluate("vars.missing.deep", &env), Err(ExprError::Eval { .. })));
        assert!(matches!(evaluate("len(vars.id)", &env), Err(ExprError::Eval { .. })));
        assert!(matches!(evaluate("matches('a', '(')", &env), Err(ExprError::Eval { .. })));
    }

    #[test]
    fn test_to_display_string() {
        assert_eq!(to_display_string(&json!("x")), "x");
        assert_eq!(to_display_string(&Value::Null), "<nil>");
        assert_eq!(to_display_string(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
