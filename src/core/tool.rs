// src/core/tool.rs

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Longest stderr excerpt kept on a failure.
const STDERR_EXCERPT: usize = 2048;

/// How an external program failed to produce usable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// The process could not be started (missing binary, permissions).
    Spawn(String),
    /// Waiting for the process or reading its pipes failed.
    Io(String),
    /// The process ran and exited unsuccessfully. `code` is `None` when it was
    /// killed by a signal.
    Status { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitInfo::Spawn(e) => write!(f, "could not start: {e}"),
            ExitInfo::Io(e) => write!(f, "i/o error: {e}"),
            ExitInfo::Status { code: Some(code), stderr } if stderr.is_empty() => {
                write!(f, "exited with status {code}")
            }
            ExitInfo::Status { code: Some(code), stderr } => {
                write!(f, "exited with status {code}: {stderr}")
            }
            ExitInfo::Status { code: None, .. } => write!(f, "terminated by signal"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{program} {exit}")]
pub struct ToolFailure {
    pub program: String,
    pub exit: ExitInfo,
}

/// Runs one external scanning program and returns its JSON-lines output.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[String]>,
    ) -> Result<Vec<Value>, ToolFailure>;
}

/// Spawns real subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[String]>,
    ) -> Result<Vec<Value>, ToolFailure> {
        let failure = |exit| ToolFailure { program: program.to_string(), exit };

        info!(program, args = ?args, stdin_lines = stdin.map_or(0, |s| s.len()), "Invoking tool.");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A stage timeout drops this future; the child must not outlive it.
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| failure(ExitInfo::Spawn(e.to_string())))?;

        // Feed stdin from its own task so a chatty program can't deadlock us on a full pipe.
        let writer = match (stdin, child.stdin.take()) {
            (Some(lines), Some(mut pipe)) => {
                let payload = lines.join("\n");
                let program = program.to_string();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(payload.as_bytes()).await {
                        // The program may exit before reading everything; its exit status decides.
                        warn!(program = %program, error = %e, "Could not write tool stdin.");
                    }
                    drop(pipe);
                }))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failure(ExitInfo::Io(e.to_string())))?;

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = excerpt(stderr.trim());
            warn!(program, code = ?output.status.code(), stderr = %stderr, "Tool exited unsuccessfully.");
            return Err(failure(ExitInfo::Status { code: output.status.code(), stderr }));
        }

        let records = parse_json_lines(program, &String::from_utf8_lossy(&output.stdout));
        info!(program, records = records.len(), "Tool finished.");
        Ok(records)
    }
}

/// Parses one JSON object per line. Blank lines are ignored; anything else
/// that isn't a JSON object is logged and skipped, since the tools sometimes
/// interleave diagnostics with their records.
pub fn parse_json_lines(program: &str, stdout: &str) -> Vec<Value> {
    let mut records = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => records.push(value),
            Ok(other) => {
                warn!(program, line, kind = json_kind(&other), "Skipping non-object JSON line.");
            }
            Err(e) => {
                warn!(program, line, error = %e, "Skipping unparsable output line.");
            }
        }
    }
    debug!(program, parsed = records.len(), "Parsed tool output.");
    records
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= STDERR_EXCERPT {
        return text.to_string();
    }
    let mut end = STDERR_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
