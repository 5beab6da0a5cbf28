//! Exec runner.
//!
//! Runs a shell command and records `{stdout, stderr, exit_code}`. A
//! non-zero exit code is recorded, not raised; assert on it with `test`.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as ProcessCommand;

use crate::error::{Error, Result};

/// A parsed exec payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub command: String,
    pub stdin: Option<String>,
}

impl ExecCommand {
    /// Parse a `{command: string, stdin?: string}` payload.
    pub fn from_value(v: &Value) -> Result<Self> {
        let invalid = || Error::config(format!("invalid exec command: {v}"));
        let command = v.get("command").and_then(Value::as_str).ok_or_else(invalid)?;
        let stdin = match v.get("stdin") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(invalid()),
        };
        Ok(Self { command: command.to_string(), stdin })
    }
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ExecRunner {
    working_dir: Option<PathBuf>,
}

impl ExecRunner {
    /// Create an exec runner that runs commands in `working_dir`.
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self { working_dir }
    }

    /// Run the command and return the value to record.
    pub async fn run(&self, command: &ExecCommand) -> Result<Value> {
        let (shell, shell_arg) = get_shell();
        let mut cmd = ProcessCommand::new(shell);
        cmd.arg(shell_arg).arg(&command.command);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(if command.stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(command = %command.command, "Running command");
        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (&command.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        let mut out = Map::new();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        out.insert("stdout".to_string(), Value::String(stdout));
        out.insert("stderr".to_string(), Value::String(stderr));
        out.insert("exit_code".to_string(), output.status.code().map_or(Value::Null, Value::from));
        Ok(Value::Object(out))
    }
}

fn get_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_command() {
        let cmd = ExecCommand::from_value(&json!({"command": "echo hi"})).unwrap();
        assert_eq!(cmd, ExecCommand { command: "echo hi".into(), stdin: None });
        assert!(ExecCommand::from_value(&json!({"stdin": "x"})).is_err());
        assert!(ExecCommand::from_value(&json!({"command": "cat", "stdin": 1})).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let runner = ExecRunner::default();
        let got = runner
            .run(&ExecCommand { command: "echo hello; echo oops >&2; exit 3".into(), stdin: None })
            .await
            .unwrap();
        assert_eq!(got, json!({"stdout": "hello\n", "stderr": "oops\n", "exit_code": 3}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let runner = ExecRunner::default();
        let got = runner
            .run(&ExecCommand { command: "cat".into(), stdin: Some("piped".into()) })
            .await
            .unwrap();
        assert_eq!(got["stdout"], json!("piped"));
        assert_eq!(got["exit_code"], json!(0));
    }
}
