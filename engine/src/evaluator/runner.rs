//! Fixture execution backends

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Executes an artifact's entry point on one fixture input
#[async_trait]
pub trait FixtureRunner: Send + Sync {
    /// Returns the entry point's result as JSON, or the error text when the
    /// program raised, timed out or printed nothing usable.
    async fn run(&self, code: &str, entry_point: &str, input: &Value) -> Result<Value, String>;
}

const RESULT_MARKER: &str = "__COE_RESULT__";

const HARNESS: &str = r#"import json
import sys

import solution

args = json.load(sys.stdin)
fn = getattr(solution, sys.argv[1])
if isinstance(args, dict):
    result = fn(**args)
elif isinstance(args, list):
    result = fn(*args)
elif args is None:
    result = fn()
else:
    result = fn(args)


def _plain(value):
    if hasattr(value, "tolist"):
        return value.tolist()
    if hasattr(value, "item"):
        return value.item()
    return float(value)


sys.stdout.write("\n__COE_RESULT__" + json.dumps(result, default=_plain) + "\n")
"#;

/// Runs Python programs in a scratch directory
#[derive(Debug, Clone)]
pub struct PythonRunner {
    interpreter: String,
    timeout: Duration,
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Whether the interpreter can be started at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Last meaningful stderr line, usually the exception
fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.last() {
        Some(last) => {
            let tail = lines[lines.len().saturating_sub(4)..].join("\n");
            if tail.len() > 2000 {
                last.to_string()
            } else {
                tail
            }
        }
        None => "process failed without output".to_string(),
    }
}

#[async_trait]
impl FixtureRunner for PythonRunner {
    async fn run(&self, code: &str, entry_point: &str, input: &Value) -> Result<Value, String> {
        let dir = tempfile::tempdir().map_err(|e| format!("cannot create scratch dir: {}", e))?;
        tokio::fs::write(dir.path().join("solution.py"), code)
            .await
            .map_err(|e| format!("cannot write program: {}", e))?;
        tokio::fs::write(dir.path().join("harness.py"), HARNESS)
            .await
            .map_err(|e| format!("cannot write harness: {}", e))?;

        let mut child = Command::new(&self.interpreter)
            .arg("harness.py")
            .arg(entry_point)
            .current_dir(dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot start {}: {}", self.interpreter, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(input).map_err(|e| e.to_string())?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| format!("cannot send fixture input: {}", e))?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("execution failed: {}", e)),
            Err(_) => return Err(format!("timed out after {:?}", self.timeout)),
        };

        if !output.status.success() {
            return Err(summarize_stderr(&String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find_map(|l| l.strip_prefix(RESULT_MARKER))
            .ok_or_else(|| "program produced no result".to_string())?;

        serde_json::from_str(line).map_err(|e| format!("unreadable result {:?}: {}", line, e))
    }
}
