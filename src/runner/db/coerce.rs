//! Normalization of driver column values into [`Value`].
//!
//! Values the driver already typed (integers, reals, text, NULL) pass
//! through unchanged. Byte-encoded values are interpreted according to the
//! column's declared type name:
//!
//! | declared type contains        | result                         |
//! |-------------------------------|--------------------------------|
//! | `TEXT`, `CHAR`, or is `TIME`  | string                         |
//! | `DECIMAL`, `FLOAT`, `DOUBLE`  | 64-bit float                   |
//! | `DATE`, `TIMESTAMP`           | RFC 3339 timestamp string      |
//! | `JSONB`                       | mapping                        |
//! | anything else                 | integer (covers tinyint bools) |

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value};

use super::DbError;

/// A column value as handed over by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<ValueRef<'_>> for ColumnValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Bytes(b.to_vec()),
        }
    }
}

/// Normalize one column value.
pub fn normalize(
    column: &str,
    decl_type: Option<&str>,
    value: ColumnValue,
) -> Result<Value, DbError> {
    let bytes = match value {
        ColumnValue::Null => return Ok(Value::Null),
        ColumnValue::Integer(i) => return Ok(Value::from(i)),
        ColumnValue::Real(f) => {
            return Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        ColumnValue::Text(s) => return Ok(Value::String(s)),
        ColumnValue::Bytes(b) => b,
    };

    let type_name = decl_type.unwrap_or_default().to_uppercase();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let invalid = |reason: String| DbError::InvalidColumn {
        column: column.to_string(),
        type_name: type_name.clone(),
        value: text.clone(),
        reason,
    };

    if type_name.contains("TEXT") || type_name.contains("CHAR") || type_name == "TIME" {
        return Ok(Value::String(text));
    }
    if type_name.contains("DECIMAL") || type_name.contains("FLOAT") || type_name.contains("DOUBLE")
    {
        let num = text.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
        return Number::from_f64(num)
            .map(Value::Number)
            .ok_or_else(|| invalid("not a finite number".to_string()));
    }
    if type_name.contains("DATE") || type_name.contains("TIMESTAMP") {
        let ts =
            parse_datetime(&text).ok_or_else(|| invalid("unrecognized date format".to_string()))?;
        return Ok(Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
    }
    if type_name.contains("JSONB") {
        let map: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        return Ok(Value::Object(map));
    }

    let num = text.trim().parse::<i64>().map_err(|e| invalid(e.to_string()))?;
    Ok(Value::from(num))
}

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y%m%d%H%M%S",
];

const DATE_FORMATS: &[&str] =
    &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%d %B %Y", "%B %d, %Y"];

/// Parse a timestamp in any of the common database and human layouts.
///
/// Values without an offset are taken as UTC. Bare 10 / 13 digit numbers are
/// read as Unix seconds / milliseconds.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        match s.len() {
            10 => return s.parse::<i64>().ok().and_then(|n| Utc.timestamp_opt(n, 0).single()),
            13 => {
                return s.parse::<i64>().ok().and_then(|n| Utc.timestamp_millis_opt(n).single())
            }
            _ => {}
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
