//! Event kinds published on a world's bus (spec §3 "Event", §4.3).
//!
//! Shape is grounded in `querymt_agent::events::{AgentEvent, AgentEventKind,
//! EventObserver}`: a sequenced, timestamped envelope around a tagged enum,
//! broadcast to subscribers and fanned out to detached observer tasks.
//! Narrowed to the five kinds the spec actually names (`message`, `sse`,
//! `tool`, `activity`, `system`, `log`) instead of the teacher's
//! domain-tracking variants (tasks/decisions/delegations/snapshots), which
//! belong to a different product.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// An SSE-style streaming lifecycle event for one in-flight LLM response
/// (spec §3 `sse`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SseEventType {
    Start,
    Chunk,
    End,
    Error,
    ToolStream,
}

/// Lifecycle event for one tool invocation (spec §3 `tool`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolEventType {
    ToolStart,
    ToolResult,
    ToolError,
    ToolProgress,
}

/// World/chat lifecycle markers not tied to a single message (spec §3
/// `system`): cancellation, queueing, provider switches, and the like.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventType {
    Cancelled,
    Queued,
    ProcessingStarted,
    ProcessingEnded,
    TurnLimitReached,
    HitlOptionRequest,
}

/// Log severity republished on the bus as first-class `log` events (spec
/// §10.2 ambient stack addition), mirroring what `log::Level` already carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEvent {
    pub seq: u64,
    pub timestamp: i64,
    pub world_id: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A finalized message became visible in a chat (spec §3 `message`).
    Message {
        message_id: String,
        sender: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    /// Streaming lifecycle for one LLM response (spec §3 `sse`).
    Sse {
        message_id: String,
        agent_name: String,
        event_type: SseEventType,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
    /// Tool invocation lifecycle (spec §3 `tool`).
    Tool {
        tool_use_id: String,
        tool_name: String,
        event_type: ToolEventType,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
    /// Background activity tracking, e.g. in-flight operation counts (spec
    /// §3 `activity`).
    Activity {
        event_type: String,
        pending_operations: usize,
        activity_id: String,
        source: String,
        active_sources: Vec<String>,
    },
    /// World/chat lifecycle marker (spec §3 `system`).
    System {
        event_type: SystemEventType,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Present on `hitl_option_request` (spec §4.10).
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<crate::model::HitlOption>>,
    },
    /// Structured log line republished on the bus (spec §3 `log`, §10.2).
    Log {
        category: String,
        level: LogLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
}

#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, event: &WorldEvent) -> Result<(), WorldError>;
}
