//! Core entity types (spec §3 Data Model).
//!
//! Grounded in `querymt_agent::model`'s plain-struct entities, trimmed of the
//! teacher's remote-mesh/quorum fields: a `World` here owns agents and chats
//! directly rather than delegating to a distributed session registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use agentworld_llm::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in an agent's memory (spec §3 `AgentMessage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl AgentMessage {
    pub fn is_user_visible(&self) -> bool {
        matches!(self.role, MessageRole::User | MessageRole::Assistant)
    }
}

/// LLM-backed participant with memory (spec §3 `Agent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub auto_reply: bool,
    pub llm_call_count: u64,
    pub last_active: Option<i64>,
    pub last_llm_call: Option<i64>,
    /// Weak back-reference (spec §9: "weak back-references are a relation +
    /// lookup, never ownership").
    pub world_id: String,
}

/// A session within a world (spec §3 `Chat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub world_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub message_count: u64,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

/// Named conversation container with agents and chats (spec §3 `World`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub turn_limit: u32,
    pub current_chat_id: Option<String>,
    pub chat_llm_provider: Option<String>,
    pub chat_llm_model: Option<String>,
    pub main_agent: Option<String>,
    pub mcp_config: Option<String>,
    pub variables: String,
    pub is_processing: bool,
    pub created_at: i64,
    pub last_updated: i64,
}

impl World {
    /// Invariant (spec §3): `currentChatId==null` iff session mode is OFF.
    pub fn session_mode_on(&self) -> bool {
        self.current_chat_id.is_some()
    }

    pub fn working_directory(&self) -> Option<String> {
        crate::config::working_directory(&self.variables)
    }
}

/// Human-in-the-loop option request (spec §3 `HITL Request`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlRequest {
    pub request_id: String,
    pub world_id: String,
    pub kind: String,
    pub prompt: String,
    pub options: Vec<HitlOption>,
    pub created_at: i64,
    pub resolved: bool,
}

/// Per-turn counters (SPEC_FULL §11, mirrors the teacher's `ExecutionMetrics`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub steps: u32,
    pub turns: u32,
}

/// Parsed view of `World.variables` (opaque `key=value` text, spec §3/§4.6).
pub type Variables = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn world(current_chat_id: Option<&str>) -> World {
        World {
            id: "w1".into(),
            name: "World".into(),
            description: None,
            turn_limit: 10,
            current_chat_id: current_chat_id.map(str::to_string),
            chat_llm_provider: None,
            chat_llm_model: None,
            main_agent: None,
            mcp_config: None,
            variables: "working_directory=/tmp/ws".into(),
            is_processing: false,
            created_at: 0,
            last_updated: 0,
        }
    }

    #[test]
    fn session_mode_tracks_current_chat_presence() {
        assert!(!world(None).session_mode_on());
        assert!(world(Some("c1")).session_mode_on());
    }

    #[test]
    fn working_directory_reads_from_variables() {
        assert_eq!(world(None).working_directory().as_deref(), Some("/tmp/ws"));
    }
}
