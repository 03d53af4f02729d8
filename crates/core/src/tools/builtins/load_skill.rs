//! `load_skill` builtin tool (spec §4.6, §6, §10.3).
//!
//! Grounded in `querymt_agent::skills::discovery`'s project/global search
//! path layout (`.skills/`, `.claude/skills/`, `.agents/skills/` under the
//! project root; `~/.qmt/skills` etc. globally) and its project-overrides-
//! global priority, trimmed to a single-file lookup: given a skill id, read
//! `<source>/<id>/SKILL.md`. The `AGENT_WORLD_ENABLE_GLOBAL_SKILLS` /
//! `AGENT_WORLD_ENABLE_PROJECT_SKILLS` toggles are read at point of use
//! (never cached) so a runtime change takes effect on the next call.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use agentworld_llm::Tool as ToolDefinition;

use crate::tools::{CapabilityRequirement, Tool as ToolTrait, ToolContext, ToolError};

const SKILL_FILENAME: &str = "SKILL.md";

pub struct LoadSkillTool;

impl Default for LoadSkillTool {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSkillTool {
    pub fn new() -> Self {
        Self
    }

    fn env_enabled(var: &str) -> bool {
        std::env::var(var).map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(true)
    }

    fn project_search_paths(working_directory: &Path) -> Vec<PathBuf> {
        vec![
            working_directory.join(".skills"),
            working_directory.join(".claude/skills"),
            working_directory.join(".agents/skills"),
        ]
    }

    fn global_search_paths(home: &Path) -> Vec<PathBuf> {
        vec![
            home.join(".qmt/skills"),
            home.join(".claude/skills"),
            home.join(".agents/skills"),
        ]
    }

    async fn find_skill_text(&self, id: &str, context: &dyn ToolContext) -> Option<String> {
        let mut candidates = Vec::new();

        if Self::env_enabled("AGENT_WORLD_ENABLE_PROJECT_SKILLS") {
            if let Some(wd) = context.working_directory() {
                candidates.extend(Self::project_search_paths(wd));
            }
        }
        if Self::env_enabled("AGENT_WORLD_ENABLE_GLOBAL_SKILLS") {
            if let Some(home) = context.home_dir() {
                candidates.extend(Self::global_search_paths(home));
            }
        }

        for base in candidates {
            let path = base.join(id).join(SKILL_FILENAME);
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                return Some(text);
            }
        }
        None
    }
}

#[async_trait]
impl ToolTrait for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Load the full text of a named skill, searching project-local then global skill \
             directories. Returns <skill_context> wrapping either the skill text or 'not found'.",
            json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Skill identifier, matching its directory name."
                    }
                },
                "required": ["id"]
            }),
        )
    }

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[CapabilityRequirement::Filesystem]
    }

    async fn call(&self, args: Value, context: &dyn ToolContext) -> Result<String, ToolError> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("id is required".to_string()))?;

        let body = self.find_skill_text(id, context).await.unwrap_or_else(|| "not found".to_string());
        Ok(format!("<skill_context id=\"{}\">\n{}\n</skill_context>", id, body.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::AgentToolContext;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn loads_project_skill_text() {
        let temp_dir = TempDir::new().unwrap();
        let skill_dir = temp_dir.path().join(".skills/formatting");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("SKILL.md"), "Format code consistently.").unwrap();

        let context = AgentToolContext::new("w1", Some(temp_dir.path().to_path_buf()));
        let tool = LoadSkillTool::new();

        let result = tool.call(json!({ "id": "formatting" }), &context).await.unwrap();
        assert!(result.starts_with("<skill_context id=\"formatting\">"));
        assert!(result.contains("Format code consistently."));
        assert!(result.ends_with("</skill_context>"));
    }

    #[tokio::test]
    async fn returns_not_found_for_missing_skill() {
        let temp_dir = TempDir::new().unwrap();
        let context = AgentToolContext::new("w1", Some(temp_dir.path().to_path_buf()));
        let tool = LoadSkillTool::new();

        let result = tool.call(json!({ "id": "nonexistent" }), &context).await.unwrap();
        assert_eq!(result, "<skill_context id=\"nonexistent\">\nnot found\n</skill_context>");
    }

    #[tokio::test]
    async fn project_toggle_disables_project_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let skill_dir = temp_dir.path().join(".skills/formatting");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("SKILL.md"), "Format code consistently.").unwrap();

        let context = AgentToolContext::new("w1", Some(temp_dir.path().to_path_buf()));
        let tool = LoadSkillTool::new();

        // SAFETY: tests run single-threaded per-process for env mutation; no
        // other test in this module reads AGENT_WORLD_ENABLE_PROJECT_SKILLS.
        unsafe {
            std::env::set_var("AGENT_WORLD_ENABLE_PROJECT_SKILLS", "0");
        }
        let result = tool.call(json!({ "id": "formatting" }), &context).await.unwrap();
        unsafe {
            std::env::remove_var("AGENT_WORLD_ENABLE_PROJECT_SKILLS");
        }

        assert!(result.contains("not found"));
    }
}
