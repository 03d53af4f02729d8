//! Structured error type for the world orchestrator.
//!
//! Every variant carries typed context; [`WorldError::http_prefix`] maps
//! variants the facade must surface with an HTTP-semantic prefix (spec §7)
//! the way `AgentError` mapped variants onto ACP error codes.

use agentworld_llm::LLMError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WorldError {
    #[error("world not found: {world_id}")]
    WorldNotFound { world_id: String },

    #[error("world name already exists: {name}")]
    WorldNameConflict { name: String },

    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("chat not found: {chat_id}")]
    ChatNotFound { chat_id: String },

    #[error("message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("processing already in progress for chat {chat_id}")]
    ProcessingInProgress { chat_id: String },

    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("working directory mismatch: {path}")]
    WorkingDirectoryMismatch { path: String },

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("provider error: {0}")]
    Provider(#[from] LLMError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("HITL request {request_id} timed out")]
    HitlTimeout { request_id: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorldError {
    /// HTTP-semantic prefix used by facade consumers when surfacing errors
    /// outward (spec §7: 404/409/400-shaped failures).
    pub fn http_prefix(&self) -> Option<&'static str> {
        match self {
            WorldError::WorldNotFound { .. }
            | WorldError::AgentNotFound { .. }
            | WorldError::ChatNotFound { .. }
            | WorldError::MessageNotFound { .. }
            | WorldError::ToolNotFound { .. } => Some("404"),
            WorldError::WorldNameConflict { .. } | WorldError::ProcessingInProgress { .. } => Some("409"),
            WorldError::WorkingDirectoryMismatch { .. } => Some("400"),
            _ => None,
        }
    }

    /// Whether the failed operation should be retried locally rather than
    /// surfaced to the caller (spec §7): transient provider errors and
    /// storage writes get a bounded retry; everything else does not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorldError::Provider(e) => e.is_transient(),
            WorldError::Storage(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for WorldError {
    fn from(e: serde_json::Error) -> Self {
        WorldError::Serialization(e.to_string())
    }
}

impl From<anyhow::Error> for WorldError {
    fn from(e: anyhow::Error) -> Self {
        WorldError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(
            WorldError::WorldNotFound { world_id: "w1".into() }.http_prefix(),
            Some("404")
        );
        assert_eq!(
            WorldError::ToolNotFound { name: "shell_cmd".into() }.http_prefix(),
            Some("404")
        );
    }

    #[test]
    fn conflict_variants_map_to_409() {
        assert_eq!(
            WorldError::WorldNameConflict { name: "w1".into() }.http_prefix(),
            Some("409")
        );
        assert_eq!(
            WorldError::ProcessingInProgress { chat_id: "c1".into() }.http_prefix(),
            Some("409")
        );
    }

    #[test]
    fn containment_violation_maps_to_400() {
        assert_eq!(
            WorldError::WorkingDirectoryMismatch { path: "/etc".into() }.http_prefix(),
            Some("400")
        );
    }

    #[test]
    fn internal_error_has_no_http_prefix() {
        assert_eq!(WorldError::Internal("oops".into()).http_prefix(), None);
    }

    #[test]
    fn transient_provider_error_is_recoverable() {
        let err = WorldError::Provider(LLMError::RateLimited {
            message: "slow down".into(),
            retry_after_ms: Some(500),
        });
        assert!(err.is_recoverable());
    }

    #[test]
    fn auth_provider_error_is_not_recoverable() {
        let err = WorldError::Provider(LLMError::Auth("bad key".into()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn world_error_serde_round_trip() {
        let original = WorldError::ChatNotFound { chat_id: "c-1".into() };
        let json = serde_json::to_string(&original).unwrap();
        let restored: WorldError = serde_json::from_str(&json).unwrap();
        assert_eq!(original.to_string(), restored.to_string());
    }
}
