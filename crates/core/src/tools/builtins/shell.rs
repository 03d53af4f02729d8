//! `shell_cmd` builtin tool (spec §4.6).
//!
//! Grounded in `querymt_agent::tools::builtins::shell::ShellTool`'s
//! cancellable `tokio::process::Command` spawn/wait skeleton, extended with
//! the much larger surface spec §4.6 asks of this tool: containment
//! enforcement on `directory` and path-shaped parameters, inline-script
//! rejection, `output_format` branching, artifact hashing, a timeout with
//! process-tree kill, and a bounded execution history ring.

use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use agentworld_llm::Tool as ToolDefinition;

use crate::tools::context::check_containment;
use crate::tools::{CapabilityRequirement, Tool as ToolTrait, ToolContext, ToolError};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const HISTORY_CAPACITY: usize = 1024;
const INLINE_SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh"];

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub command: String,
    pub parameters: Vec<String>,
    pub exit_code: Option<i32>,
    pub started_at: i64,
    pub duration_ms: u64,
    pub stdout_head: String,
}

pub struct ShellCmdTool {
    history: Arc<parking_lot::Mutex<VecDeque<HistoryEntry>>>,
}

impl Default for ShellCmdTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellCmdTool {
    pub fn new() -> Self {
        Self {
            history: Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY))),
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    fn record_history(&self, entry: HistoryEntry) {
        let mut history = self.history.lock();
        history.push_front(entry);
        history.truncate(HISTORY_CAPACITY);
    }

    fn is_inline_shell_invocation(command: &str, parameters: &[String]) -> bool {
        let basename = Path::new(command).file_name().and_then(|n| n.to_str()).unwrap_or(command);
        INLINE_SHELLS.contains(&basename) && parameters.iter().any(|p| p == "-c")
    }

    fn looks_like_path(s: &str) -> bool {
        s.starts_with('/') || s.starts_with('~') || s.starts_with("./") || s.starts_with("../")
    }

    /// Extracts path-shaped candidates from positional args and `--flag=/path`
    /// / `-I/path` forms (spec §4.6).
    fn extract_path_candidates(parameters: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for param in parameters {
            if let Some(rest) = param.strip_prefix("--") {
                if let Some((_, value)) = rest.split_once('=') {
                    if Self::looks_like_path(value) {
                        out.push(value.to_string());
                    }
                    continue;
                }
            }
            if !param.starts_with("--") && param.starts_with('-') && param.len() > 2 {
                let rest = &param[2..];
                if Self::looks_like_path(rest) {
                    out.push(rest.to_string());
                    continue;
                }
            }
            if Self::looks_like_path(param) {
                out.push(param.clone());
            }
        }
        out
    }

    /// Checks every path-shaped candidate against `root`; returns the first
    /// violation message, if any.
    fn check_all_containment(root: &Path, candidates: &[String], home: Option<&Path>) -> Option<String> {
        for candidate in candidates {
            if check_containment(root, Path::new(candidate), home).is_err() {
                return Some(format!("Working directory mismatch: {}", candidate));
            }
        }
        None
    }

    async fn compute_artifacts(paths: &[String]) -> Vec<Value> {
        let mut artifacts = Vec::new();
        for path in paths {
            let Ok(bytes) = tokio::fs::read(path).await else {
                continue;
            };
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let digest = hasher.finalize();
            artifacts.push(json!({
                "path": path,
                "sha256": hex::encode(digest),
                "bytes": bytes.len(),
            }));
        }
        artifacts
    }
}

#[async_trait]
impl ToolTrait for ShellCmdTool {
    fn name(&self) -> &str {
        "shell_cmd"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Run a shell command under the world's working directory and return its output. \
             Does not accept inline shell scripts (`sh -c`, `bash -c`); pass the command and its \
             arguments as separate parameters.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Executable to run."
                    },
                    "parameters": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments for the command."
                    },
                    "directory": {
                        "type": "string",
                        "description": "Working directory override. Must equal the world's working directory when one is set."
                    },
                    "output_format": {
                        "type": "string",
                        "enum": ["text", "json"],
                        "default": "text"
                    },
                    "artifact_paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Paths to hash after execution (sha256 + byte count)."
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in milliseconds. Defaults to 30000.",
                        "default": 30000,
                        "minimum": 1
                    }
                },
                "required": ["command"]
            }),
        )
    }

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[CapabilityRequirement::Filesystem]
    }

    fn truncation_hint(&self) -> Option<&'static str> {
        Some("TIP: pipe command output through grep/head/tail to filter results, or use the grep tool.")
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("command is required".to_string()))?
            .to_string();

        let parameters: Vec<String> = args
            .get("parameters")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if Self::is_inline_shell_invocation(&command, &parameters) {
            return Ok("inline script execution not permitted".to_string());
        }

        let output_format = args.get("output_format").and_then(Value::as_str).unwrap_or("text");
        let timeout_ms = args.get("timeout").and_then(Value::as_u64).unwrap_or(DEFAULT_TIMEOUT_MS);
        let artifact_paths: Vec<String> = args
            .get("artifact_paths")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let working_directory = context.working_directory().map(Path::to_path_buf);
        let directory_arg = args.get("directory").and_then(Value::as_str);

        let effective_dir = match (directory_arg, &working_directory) {
            (Some(dir_arg), Some(wd)) => {
                let normalized_arg = match check_containment(wd, Path::new(dir_arg), context.home_dir()) {
                    Ok(p) => p,
                    Err(_) => return Ok(format!("Working directory mismatch: {}", dir_arg)),
                };
                if normalized_arg != wd.as_path() {
                    return Ok(format!("Working directory mismatch: {}", dir_arg));
                }
                wd.clone()
            }
            (Some(dir_arg), None) => PathBuf::from(dir_arg),
            (None, Some(wd)) => wd.clone(),
            (None, None) => std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        };

        if let Some(ref wd) = working_directory {
            let mut candidates = Self::extract_path_candidates(&parameters);
            candidates.extend(artifact_paths.iter().cloned());
            if let Some(violation) = Self::check_all_containment(wd, &candidates, context.home_dir()) {
                return Ok(violation);
            }
        }

        let mut cmd = Command::new(&command);
        cmd.args(&parameters);
        cmd.current_dir(&effective_dir);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let started_at = time::OffsetDateTime::now_utc().unix_timestamp();
        let start = std::time::Instant::now();

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::Execution(format!("command failed to spawn: {}", e)))?;

        let cancel = context.cancellation_token();

        let wait_handle = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();
            let (_, _) = tokio::join!(
                async {
                    if let Some(ref mut s) = stdout {
                        let _ = s.read_to_end(&mut stdout_buf).await;
                    }
                },
                async {
                    if let Some(ref mut s) = stderr {
                        let _ = s.read_to_end(&mut stderr_buf).await;
                    }
                },
            );
            let status = child.wait().await;
            (status, stdout_buf, stderr_buf)
        });

        tokio::pin!(wait_handle);

        let (exit_code, stdout_str, stderr_str, timed_out) = tokio::select! {
            result = &mut wait_handle => {
                let (status, stdout_buf, stderr_buf) = result
                    .map_err(|e| ToolError::Execution(format!("task join failed: {}", e)))?;
                let status = status.map_err(|e| ToolError::Execution(format!("command failed: {}", e)))?;
                (
                    status.code(),
                    String::from_utf8_lossy(&stdout_buf).into_owned(),
                    String::from_utf8_lossy(&stderr_buf).into_owned(),
                    false,
                )
            }
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                wait_handle.abort();
                (None, String::new(), String::new(), true)
            }
            _ = cancel.cancelled() => {
                wait_handle.abort();
                return Ok("cancelled".to_string());
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        self.record_history(HistoryEntry {
            command: command.clone(),
            parameters: parameters.clone(),
            exit_code,
            started_at,
            duration_ms,
            stdout_head: stdout_str.chars().take(200).collect(),
        });

        let artifacts = Self::compute_artifacts(&artifact_paths).await;

        if output_format == "json" {
            return serde_json::to_string(&json!({
                "exit_code": exit_code,
                "stdout": stdout_str,
                "stderr": stderr_str,
                "timed_out": timed_out,
                "duration_ms": duration_ms,
                "artifacts": artifacts,
            }))
            .map_err(|e| ToolError::Execution(format!("serialize failed: {}", e)));
        }

        if timed_out {
            return Ok(format!(
                "**Command:** {} {}\n\nTimed out after {}ms\n\nstderr:\n{}",
                command,
                parameters.join(" "),
                timeout_ms,
                stderr_str.trim()
            ));
        }

        Ok(format!(
            "**Command:** {} {}\n\n{}\n{}\n\nExit code {}",
            command,
            parameters.join(" "),
            stdout_str.trim(),
            stderr_str.trim(),
            exit_code.unwrap_or(-1)
        ))
    }
}
