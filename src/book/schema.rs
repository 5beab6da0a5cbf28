//! Book schema definitions.
//!
//! Defines the YAML structure for scenario books.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::parser::parse_duration;
use crate::error::Result;

/// A scenario book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    /// Description of the scenario
    #[serde(default)]
    pub desc: String,

    /// Runner definitions (name -> DSN, URL or `{endpoint: url}`)
    #[serde(default)]
    pub runners: Map<String, Value>,

    /// Variables seeded into the store
    #[serde(default)]
    pub vars: Map<String, Value>,

    /// Print step progress to the operator output
    #[serde(default)]
    pub debug: bool,

    /// Delay between steps
    #[serde(default)]
    pub interval: Option<Interval>,

    /// Guard expression; the scenario is skipped unless it is true
    #[serde(default, rename = "if")]
    pub cond: Option<String>,

    /// Steps to execute
    #[serde(default)]
    pub steps: Steps,

    /// File the book was loaded from
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

/// Steps as declared in a book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Steps {
    /// `steps:` is a sequence; results are stored positionally.
    List(Vec<Value>),
    /// `steps:` is a mapping; results are stored by step name.
    Named(Map<String, Value>),
}

impl Default for Steps {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Steps {
    /// Number of steps.
    pub fn len(&self) -> usize {
        match self {
            Self::List(s) => s.len(),
            Self::Named(s) => s.len(),
        }
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Steps paired with their name, if any.
    pub fn entries(&self) -> Vec<(Option<String>, Value)> {
        match self {
            Self::List(s) => s.iter().map(|v| (None, v.clone())).collect(),
            Self::Named(s) => s.iter().map(|(k, v)| (Some(k.clone()), v.clone())).collect(),
        }
    }
}

/// Inter-step delay: whole seconds or a string such as `500ms`, `1s`, `2min`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Interval {
    Seconds(u64),
    Text(String),
}

impl Interval {
    /// Convert to a duration.
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            Self::Seconds(s) => Ok(Duration::from_secs(*s)),
            Self::Text(s) => parse_duration(s),
        }
    }
}

impl Book {
    /// Delay between steps; zero when unset.
    pub fn interval(&self) -> Result<Duration> {
        self.interval.as_ref().map_or(Ok(Duration::ZERO), Interval::to_duration)
    }
}
