//! Message and tool types shared by every provider, OpenAI-chat-shaped per
//! spec §3 (`AgentMessage`). Grounded on `querymt::chat` (ChatMessage, Tool,
//! FunctionTool, ToolChoice) but reshaped: the teacher keeps `ChatRole` to
//! {User, Assistant} and folds tool results into `MessageType`; here the role
//! itself carries `system`/`tool` so a `Vec<ChatMessage>` can be handed to a
//! provider exactly as received from agent memory, with no further mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a message in a chat conversation (spec §3 `AgentMessage.role`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One call the model asked to make. `arguments` stays a raw string (not
/// parsed JSON) because partial/streamed arguments are not always valid JSON
/// until the final chunk — providers reconstruct best-effort (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

/// A single message in the unified chat shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Present on assistant messages that requested tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present on `role: tool` messages, matching the originating call id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Parameter description within a [`ParametersSchema`] (subset of JSON Schema
/// actually needed by tool definitions; mirrors `querymt::chat::ParameterProperty`).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ParameterProperty {
    #[serde(rename = "type")]
    pub property_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterProperty>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ParametersSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, ParameterProperty>,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool definition offered to the model (spec §4.4: name, description, JSON schema).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionTool,
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Token accounting, aliased across providers' differing field names the way
/// `querymt::Usage` does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    #[serde(alias = "prompt_tokens", alias = "input_tokens", alias = "prompt_eval_count")]
    pub input_tokens: u32,
    #[serde(alias = "completion_tokens", alias = "output_tokens", alias = "eval_count")]
    pub output_tokens: u32,
}

/// Unified, provider-independent response shape (spec §4.4 `LLMResponse`).
///
/// The empty-tool_calls case is deliberate: a provider response containing
/// only invalid `tool_use` entries (empty name) must still surface as
/// `ToolCalls { tool_calls: vec![] }`, never as `Text`, so the agent
/// subscriber's continuation loop recognizes a zero-effect tool turn
/// (spec §8 scenario 6) instead of treating it as a normal reply.
#[derive(Debug, Clone)]
pub enum LLMResponse {
    Text { content: String },
    ToolCalls { tool_calls: Vec<ToolCall>, content: Option<String> },
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        LLMResponse::Text { content: content.into() }
    }
}

/// Incremental events from a streaming call (spec §4.4, §4.3 sse ordering).
/// Mirrors `querymt::chat::StreamChunk`.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    ToolUseStart { index: usize, id: String, name: String },
    ToolUseInputDelta { index: usize, partial_json: String },
    ToolUseComplete { index: usize, tool_call: ToolCall },
    Usage(Usage),
    Done { stop_reason: String },
}
