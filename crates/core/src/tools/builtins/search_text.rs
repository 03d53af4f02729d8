//! `grep` builtin tool (with `grep_search` alias, spec §4.6).
//!
//! Grounded in `querymt_agent::tools::builtins::search_text::SearchTextTool`'s
//! `grep_regex`/`grep_searcher` search, rebuilt on the new
//! containment-checking [`ToolContext`]. Containment violations return the
//! literal `Working directory mismatch: <path>` string (spec §4.6) rather
//! than an `Err`.

use async_trait::async_trait;
use glob::Pattern;
use grep_regex::RegexMatcher;
use grep_searcher::{Searcher, sinks::Lossy};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;

use agentworld_llm::Tool as ToolDefinition;

use crate::tools::{CapabilityRequirement, Tool as ToolTrait, ToolContext, ToolError};

#[derive(Debug, Serialize, Deserialize)]
struct Match {
    file: String,
    line: u64,
    column: Option<u64>,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResults {
    matches: Vec<Match>,
    total_files: usize,
    total_matches: usize,
    truncated: bool,
}

pub struct GrepTool;

impl Default for GrepTool {
    fn default() -> Self {
        Self::new()
    }
}

impl GrepTool {
    pub fn new() -> Self {
        Self
    }

    fn grep_search(
        root: &Path,
        pattern: &str,
        include: Option<String>,
        exclude: Option<Vec<String>>,
        max_results: usize,
    ) -> Result<SearchResults, ToolError> {
        let matcher = RegexMatcher::new(pattern).map_err(|e| ToolError::InvalidRequest(format!("invalid pattern: {}", e)))?;
        let mut matches = Vec::new();
        let mut files_searched = 0;

        let include_pattern = include
            .map(|p| Pattern::new(&p))
            .transpose()
            .map_err(|e| ToolError::InvalidRequest(format!("invalid include pattern: {}", e)))?;

        let exclude_patterns: Vec<Pattern> = exclude
            .unwrap_or_default()
            .into_iter()
            .map(|s| Pattern::new(&s))
            .collect::<Result<_, _>>()
            .map_err(|e| ToolError::InvalidRequest(format!("invalid exclude pattern: {}", e)))?;

        for result in WalkBuilder::new(root).hidden(false).git_ignore(true).build() {
            let entry = match result {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();

            if let Some(ref include_pat) = include_pattern {
                if let Ok(relative) = path.strip_prefix(root) {
                    if !include_pat.matches_path(relative) {
                        continue;
                    }
                }
            }

            let should_exclude = exclude_patterns
                .iter()
                .any(|pat| path.strip_prefix(root).ok().map(|rel| pat.matches_path(rel)).unwrap_or(false));
            if should_exclude {
                continue;
            }

            files_searched += 1;

            Searcher::new()
                .search_path(
                    &matcher,
                    path,
                    Lossy(|lnum, line| {
                        if matches.len() >= max_results {
                            return Ok(false);
                        }
                        matches.push(Match {
                            file: path.display().to_string(),
                            line: lnum,
                            column: None,
                            text: line.trim_end().to_string(),
                        });
                        Ok(true)
                    }),
                )
                .map_err(|e| ToolError::Execution(format!("search failed: {}", e)))?;

            if matches.len() >= max_results {
                break;
            }
        }

        let mut file_times: HashMap<String, std::time::SystemTime> = HashMap::new();
        for m in &matches {
            if !file_times.contains_key(&m.file) {
                if let Ok(modified) = std::fs::metadata(&m.file).and_then(|m| m.modified()) {
                    file_times.insert(m.file.clone(), modified);
                }
            }
        }
        matches.sort_by(|a, b| file_times.get(&b.file).cmp(&file_times.get(&a.file)));

        let total_matches = matches.len();
        let truncated = total_matches >= max_results;
        Ok(SearchResults { matches, total_files: files_searched, total_matches, truncated })
    }
}

#[async_trait]
impl ToolTrait for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Search file contents under the world's working directory using a regular \
             expression. Returns matches with file/line sorted by modification time, most \
             recent first. Filter files with `include`/`exclude` glob patterns.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for in file contents."
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in. Defaults to the working directory root."
                    },
                    "include": {
                        "type": "string",
                        "description": "Glob pattern to include (e.g. \"*.rs\")."
                    },
                    "exclude": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Glob patterns to exclude."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of matches to return. Defaults to 100.",
                        "default": 100,
                        "minimum": 1
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[CapabilityRequirement::Filesystem]
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("pattern is required".to_string()))?
            .to_string();

        let path_arg = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let root = match context.resolve_and_check(path_arg) {
            Ok(root) => root,
            Err(violation) => return Ok(violation),
        };

        let include = args.get("include").and_then(Value::as_str).map(String::from);
        let exclude = args
            .get("exclude")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>());
        let max_results = args.get("max_results").and_then(Value::as_u64).unwrap_or(100) as usize;

        let results = tokio::task::spawn_blocking(move || Self::grep_search(&root, &pattern, include, exclude, max_results))
            .await
            .map_err(|e| ToolError::Execution(format!("search task failed: {}", e)))??;

        serde_json::to_string_pretty(&results).map_err(|e| ToolError::Execution(format!("serialize failed: {}", e)))
    }
}
