//! Run results and reporting.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use crossterm::style::Stylize;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Outcome of a scenario or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

/// Result of one scenario run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    /// Scenario description
    pub desc: String,

    /// Book path, if the scenario was loaded from a file
    pub path: Option<PathBuf>,

    /// Whether the scenario guard skipped the run
    pub skipped: bool,

    /// Error that ended the run
    pub err: Option<String>,

    /// Per-step results in declaration order
    pub step_results: Vec<StepResult>,

    /// Flattened store at the end of the run
    pub store: Map<String, Value>,
}

/// Result of one step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepResult {
    /// Step name, or its index in positional mode
    pub key: String,

    /// Whether the step was never run
    pub skipped: bool,

    /// Error raised by the step
    pub err: Option<String>,
}

impl RunResult {
    /// Create an empty result.
    pub fn new(desc: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self { desc: desc.into(), path, ..Self::default() }
    }

    /// Overall outcome.
    pub fn outcome(&self) -> Outcome {
        if self.err.is_some() {
            Outcome::Failure
        } else if self.skipped {
            Outcome::Skipped
        } else {
            Outcome::Success
        }
    }
}

impl StepResult {
    /// Overall outcome.
    pub fn outcome(&self) -> Outcome {
        if self.err.is_some() {
            Outcome::Failure
        } else if self.skipped {
            Outcome::Skipped
        } else {
            Outcome::Success
        }
    }
}

/// Results of a batch of scenarios.
#[derive(Debug, Default)]
pub struct RunNResult {
    total: AtomicI64,
    run_results: Mutex<Vec<RunResult>>,
}

/// Serializable summary of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunNSummary {
    pub total: i64,
    pub success: i64,
    pub failure: i64,
    pub skipped: i64,
    pub results: Vec<RunSummary>,
}

/// Serializable summary of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub path: String,
    pub result: Outcome,
    pub steps: Vec<StepSummary>,
}

/// Serializable summary of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub key: String,
    pub result: Outcome,
}

impl RunNResult {
    /// Create an empty batch result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scenarios in the batch.
    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Set the number of scenarios in the batch.
    pub fn set_total(&self, total: i64) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Add a finished scenario.
    pub fn push(&self, result: RunResult) {
        self.run_results.lock().push(result);
    }

    /// Snapshot of the scenario results collected so far.
    pub fn run_results(&self) -> Vec<RunResult> {
        self.run_results.lock().clone()
    }

    /// Whether any scenario failed.
    pub fn has_failure(&self) -> bool {
        self.run_results.lock().iter().any(|r| r.err.is_some())
    }

    /// Summarize outcomes and counts.
    pub fn simplify(&self) -> RunNSummary {
        let results = self.run_results.lock();
        let mut summary = RunNSummary { total: self.total(), ..RunNSummary::default() };

        for rr in results.iter() {
            let outcome = rr.outcome();
            match outcome {
                Outcome::Success => summary.success += 1,
                Outcome::Failure => summary.failure += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
            summary.results.push(RunSummary {
                path: rr.path.as_deref().map(shorten_path).unwrap_or_default(),
                result: outcome,
                steps: rr
                    .step_results
                    .iter()
                    .map(|sr| StepSummary { key: sr.key.clone(), result: sr.outcome() })
                    .collect(),
            });
        }
        summary
    }

    /// Write a human-readable report. Without `verbose`, failing steps are
    /// listed before the totals line.
    pub fn out(&self, out: &mut dyn Write, verbose: bool) -> Result<()> {
        writeln!(out)?;
        if !verbose && self.has_failure() {
            writeln!(out)?;
            let results = self.run_results.lock();
            for (i, rr) in results.iter().filter(|r| r.err.is_some()).enumerate() {
                let path = rr.path.as_deref().map_or_else(|| rr.desc.clone(), shorten_path);
                writeln!(out, "{}) {path}", i + 1)?;
                for err in rr.step_results.iter().filter_map(|sr| sr.err.as_deref()) {
                    let msg = format!("Failure/Error: {}", err.trim_end_matches('\n'));
                    for line in msg.lines() {
                        writeln!(out, "  {}", line.red())?;
                    }
                }
            }
        }
        writeln!(out)?;

        let s = self.simplify();
        let line = format!(
            "{}, {} skipped, {}",
            plural(s.total, "scenario", "scenarios"),
            s.skipped,
            plural(s.failure, "failure", "failures")
        );
        if s.failure > 0 {
            writeln!(out, "{}", line.red())?;
        } else {
            writeln!(out, "{}", line.green())?;
        }
        Ok(())
    }

    /// Write the summary as pretty JSON.
    pub fn out_json(&self, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, &self.simplify())?;
        writeln!(out)?;
        Ok(())
    }
}

fn plural(n: i64, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Path relative to the working directory when it lies below it.
pub fn shorten_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
