//! `read_file` builtin tool (spec §4.6).
//!
//! Grounded in `querymt_agent::tools::builtins::read_tool::ReadFileTool`'s
//! line-numbered-read shape, rebuilt on the new containment-checking
//! [`ToolContext`] rather than the teacher's soft `resolve_path`/`cwd` pair.
//! Containment violations return the bare literal
//! `Working directory mismatch: <path>` string (spec §4.6, §8 scenario 3) as
//! an `Ok` result rather than an `Err` — the invocation still succeeds from
//! the registry's point of view, it just reports the violation as the
//! tool's result, matching `list_files`/`grep`.

use async_trait::async_trait;
use serde_json::{Value, json};

use agentworld_llm::Tool as ToolDefinition;

use crate::tools::{CapabilityRequirement, Tool as ToolTrait, ToolContext, ToolError};

pub struct ReadFileTool;

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolTrait for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Read contents of a file under the world's working directory. Returns JSON with \
             line-numbered content. Supports reading the full file or a specific line range.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file, relative to the working directory or absolute."
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "Line number to start reading from (1-indexed, inclusive).",
                        "minimum": 1
                    },
                    "line_count": {
                        "type": "integer",
                        "description": "Number of lines to read from start_line.",
                        "minimum": 1
                    }
                },
                "required": ["path"]
            }),
        )
    }

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[CapabilityRequirement::Filesystem]
    }

    fn truncation_hint(&self) -> Option<&'static str> {
        Some("TIP: use grep to find specific content, or read_file's start_line/line_count to view a section.")
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("path is required".to_string()))?;

        let target = match context.resolve_and_check(path) {
            Ok(target) => target,
            Err(violation) => return Ok(violation),
        };

        let content = match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) => return Ok(json!({ "error": format!("read failed: {}", e) }).to_string()),
        };

        let start_line = args.get("start_line").and_then(Value::as_u64).map(|v| v as usize);
        let line_count = args.get("line_count").and_then(Value::as_u64).map(|v| v as usize);
        if line_count.is_some() && start_line.is_none() {
            return Err(ToolError::InvalidRequest(
                "line_count requires start_line to be specified".to_string(),
            ));
        }

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let start_idx = start_line.map(|s| s.saturating_sub(1)).unwrap_or(0);
        if start_line.is_some() && total_lines > 0 && start_idx >= total_lines {
            return Err(ToolError::InvalidRequest(format!(
                "start_line exceeds file length {}",
                total_lines
            )));
        }
        let end_idx = line_count.map(|c| (start_idx + c).min(total_lines)).unwrap_or(total_lines);

        let numbered: Vec<String> = lines[start_idx.min(total_lines)..end_idx]
            .iter()
            .enumerate()
            .map(|(offset, line)| format!("{:05}| {}", start_idx + offset + 1, line))
            .collect();

        Ok(json!({
            "path": target.display().to_string(),
            "total_lines": total_lines,
            "start_line": start_idx + 1,
            "end_line": end_idx,
            "truncated": end_idx < total_lines,
            "content": numbered.join("\n"),
        })
        .to_string())
    }
}
