//! `list_files` builtin tool (spec §4.6).
//!
//! Grounded in `querymt_agent::tools::builtins::ls::ListTool`'s
//! `ignore::WalkBuilder` + `glob::Pattern` listing, rebuilt on the new
//! containment-checking [`ToolContext`]. Containment violations return the
//! literal `Working directory mismatch: <path>` string (spec §4.6) rather
//! than an `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

use agentworld_llm::Tool as ToolDefinition;

use crate::tools::{CapabilityRequirement, Tool, ToolContext, ToolError};

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    path: String,
    entry_type: String,
    size: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListResults {
    entries: Vec<Entry>,
    total: usize,
    truncated: bool,
}

pub struct ListFilesTool;

impl ListFilesTool {
    pub fn new() -> Self {
        Self
    }

    fn default_ignores() -> Vec<&'static str> {
        vec![
            "node_modules/**",
            ".git/**",
            "dist/**",
            "build/**",
            "out/**",
            "target/**",
            ".next/**",
            ".nuxt/**",
            "vendor/**",
            "__pycache__/**",
            "*.pyc",
            ".venv/**",
            "venv/**",
            "coverage/**",
            ".cache/**",
            "tmp/**",
            "temp/**",
        ]
    }

    fn list_directory(root: &Path, ignore_patterns: Vec<&str>, limit: usize) -> Result<ListResults, ToolError> {
        use glob::Pattern;
        use ignore::WalkBuilder;

        let ignore_pats: Result<Vec<Pattern>, _> = ignore_patterns.iter().map(|p| Pattern::new(p)).collect();
        let ignore_pats = ignore_pats.map_err(|e| ToolError::InvalidRequest(format!("invalid ignore pattern: {}", e)))?;

        let mut entries = Vec::new();
        let walker = WalkBuilder::new(root).hidden(false).git_ignore(true).build();

        for result in walker {
            if entries.len() >= limit {
                break;
            }
            let entry = result.map_err(|e| ToolError::Execution(format!("error walking directory: {}", e)))?;
            let path = entry.path();

            if let Ok(relative) = path.strip_prefix(root) {
                if ignore_pats.iter().any(|pat| pat.matches_path(relative)) {
                    continue;
                }
            }

            let metadata = entry.metadata().map_err(|e| ToolError::Execution(format!("failed to get metadata: {}", e)))?;
            let entry_type = if metadata.is_dir() { "directory" } else { "file" };
            let size = if metadata.is_file() { Some(metadata.len()) } else { None };

            entries.push(Entry {
                path: path.display().to_string(),
                entry_type: entry_type.to_string(),
                size,
            });
        }

        let total = entries.len();
        let truncated = total >= limit;
        Ok(ListResults { entries, total, truncated })
    }
}

impl Default for ListFilesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Lists files and directories under the world's working directory. Path defaults to \
             the working directory root if omitted. Supports extra glob ignore patterns.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path to list, relative to the working directory or absolute."
                    },
                    "ignore": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Additional glob patterns to ignore (beyond default ignores)."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of entries to return. Defaults to 100.",
                        "default": 100,
                        "minimum": 1
                    }
                },
                "required": []
            }),
        )
    }

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[CapabilityRequirement::Filesystem]
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        let path_arg = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let root = match context.resolve_and_check(path_arg) {
            Ok(root) => root,
            Err(violation) => return Ok(violation),
        };

        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;

        let mut ignore_patterns: Vec<String> = Self::default_ignores().into_iter().map(String::from).collect();
        if let Some(user_ignores) = args.get("ignore").and_then(Value::as_array) {
            ignore_patterns.extend(user_ignores.iter().filter_map(|v| v.as_str().map(String::from)));
        }

        let results = tokio::task::spawn_blocking(move || {
            let patterns: Vec<&str> = ignore_patterns.iter().map(String::as_str).collect();
            Self::list_directory(&root, patterns, limit)
        })
        .await
        .map_err(|e| ToolError::Execution(format!("list task failed: {}", e)))??;

        serde_json::to_string_pretty(&results).map_err(|e| ToolError::Execution(format!("serialize failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::AgentToolContext;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_files_and_directories() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path();

        fs::write(temp_path.join("file1.txt"), "content").unwrap();
        fs::create_dir(temp_path.join("subdir")).unwrap();
        fs::write(temp_path.join("subdir/file2.txt"), "content").unwrap();

        let context = AgentToolContext::new("w1", Some(temp_path.to_path_buf()));
        let tool = ListFilesTool::new();

        let result = tool.call(json!({}), &context).await.unwrap();
        let parsed: ListResults = serde_json::from_str(&result).unwrap();

        assert!(parsed.entries.len() >= 2);
        assert!(parsed.entries.iter().any(|e| e.path.contains("file1.txt")));
    }

    #[tokio::test]
    async fn respects_user_ignore_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path();

        fs::write(temp_path.join("keep.txt"), "content").unwrap();
        fs::write(temp_path.join("ignore.log"), "content").unwrap();

        let context = AgentToolContext::new("w1", Some(temp_path.to_path_buf()));
        let tool = ListFilesTool::new();

        let result = tool.call(json!({ "ignore": ["*.log"] }), &context).await.unwrap();
        let parsed: ListResults = serde_json::from_str(&result).unwrap();

        assert!(parsed.entries.iter().any(|e| e.path.contains("keep.txt")));
        assert!(!parsed.entries.iter().any(|e| e.path.contains("ignore.log")));
    }

    #[tokio::test]
    async fn containment_violation_returns_literal_string() {
        let context = AgentToolContext::new("w1", Some(std::path::PathBuf::from("/tmp/ws")));
        let tool = ListFilesTool::new();

        let result = tool.call(json!({ "path": "/etc" }), &context).await.unwrap();
        assert!(result.starts_with("Working directory mismatch"));
    }
}
