//! Tool registry for managing and finding tools (spec §4.6, C6).
//!
//! Grounded almost verbatim in `querymt_agent::tools::registry::ToolRegistry`,
//! with `add_alias` added so `grep_search` can resolve to the same `grep`
//! implementation (spec §4.6).

use crate::tools::context::Tool;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for managing available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn add(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Register `alias` as another name that resolves to the tool already
    /// registered under `target`.
    pub fn add_alias(&mut self, alias: &str, target: &str) -> &mut Self {
        self.aliases.insert(alias.to_string(), target.to_string());
        self
    }

    pub fn definitions(&self) -> Vec<agentworld_llm::Tool> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        match self.tools.get(name) {
            Some(tool) => Some(tool.clone()),
            None => {
                let target = self.aliases.get(name)?;
                self.tools.get(target).cloned()
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}
