//! Book parser.
//!
//! Parses YAML books into [`Book`] structs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use walkdir::WalkDir;

use super::Book;
use crate::error::{Error, Result};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*(ns|us|µs|ms|s|sec|secs|m|min|mins|h|hr|hour|hours)?$")
        .expect("duration pattern is valid")
});

/// Parse a book from a file.
pub fn parse_book(path: &Path) -> Result<Book> {
    if !path.is_file() {
        return Err(Error::BookNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let mut book = parse_book_str(&content)?;
    book.path = Some(path.to_path_buf());
    Ok(book)
}

/// Parse a book from a string.
pub fn parse_book_str(content: &str) -> Result<Book> {
    let book: Book = serde_yaml::from_str(content)?;
    validate_book(&book)?;
    Ok(book)
}

/// Validate a book for common errors.
fn validate_book(book: &Book) -> Result<()> {
    for (name, def) in &book.runners {
        match def {
            Value::String(_) => {}
            Value::Object(m) if m.get("endpoint").is_some_and(Value::is_string) => {}
            other => {
                return Err(Error::config(format!(
                    "invalid runner definition for '{name}': {other}"
                )))
            }
        }
    }

    for (i, (key, step)) in book.steps.entries().iter().enumerate() {
        if !step.is_object() {
            let at = key.as_deref().map_or_else(|| format!("steps[{i}]"), |k| format!("steps.{k}"));
            return Err(Error::config(format!("invalid {at}: step must be a mapping: {step}")));
        }
    }

    book.interval()?;
    Ok(())
}

/// Parse an interval such as `500ms`, `1s`, `1sec`, `2min` or a bare
/// number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || Error::config(format!("invalid interval: {s}"));
    let caps = DURATION_RE.captures(s.trim()).ok_or_else(invalid)?;
    let amount: f64 = caps[1].parse().map_err(|_| invalid())?;
    let secs = match caps.get(2).map_or("s", |m| m.as_str()) {
        "ns" => amount / 1_000_000_000.0,
        "us" | "µs" => amount / 1_000_000.0,
        "ms" => amount / 1_000.0,
        "m" | "min" | "mins" => amount * 60.0,
        "h" | "hr" | "hour" | "hours" => amount * 3_600.0,
        _ => amount,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Expand files and directories into the list of books to run.
///
/// Directories are walked recursively for `*.yml` / `*.yaml` files; the
/// result is sorted and deduplicated.
pub fn discover_books(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut books = Vec::new();

    for path in paths {
        if path.is_file() {
            books.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(Error::BookNotFound(path.clone()));
        }
        for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().is_some_and(|e| e == "yaml" || e == "yml") {
                books.push(p.to_path_buf());
            }
        }
    }

    books.sort();
    books.dedup();
    Ok(books)
}
