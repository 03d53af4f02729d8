//! Edit/Resubmit Engine (spec §4.9, C9).
//!
//! Grounded in `querymt_agent::session`'s message-removal cascade, extended
//! with the spec's resubmission-under-session-mode decision tree. Open
//! Question (a) (SPEC_FULL §12) is resolved here as reject-while-processing,
//! reusing the same `isProcessing` gate `editUserMessage` already checks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorldError;
use crate::model::{AgentMessage, MessageRole, World};
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRemovalFailure {
    pub agent_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalResult {
    pub total_agents: usize,
    pub processed_agents: usize,
    pub failed_agents: Vec<AgentRemovalFailure>,
    pub messages_removed_total: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResubmissionStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResult {
    pub removal: RemovalResult,
    pub message_id: Option<String>,
    pub resubmission_status: ResubmissionStatus,
    pub resubmission_error: Option<String>,
    /// Sender of the edited message, carried out of the engine so the
    /// caller (C11) can resubmit under the same identity; not part of the
    /// API response shape, only plumbing between [`EditEngine`] and
    /// [`crate::world::WorldHandle::edit_user_message`].
    #[serde(skip)]
    pub original_sender: Option<String>,
}

pub struct EditEngine {
    storage: Arc<dyn Storage>,
}

impl EditEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Drops memory entries with `chatId===chatId` whose `createdAt >=`
    /// the target's, across every agent in the world (spec §4.9 step 3).
    pub async fn remove_messages_from(
        &self,
        world_id: &str,
        message_id: &str,
        chat_id: &str,
    ) -> Result<RemovalResult, WorldError> {
        let agents = self.storage.list_agents(world_id).await?;
        let total_agents = agents.len();
        let mut processed_agents = 0;
        let mut failed_agents = Vec::new();
        let mut messages_removed_total = 0;

        for agent in agents {
            let outcome = self.remove_messages_from_one_agent(world_id, &agent.id, message_id, chat_id).await;
            match outcome {
                Ok(removed) => {
                    messages_removed_total += removed;
                    processed_agents += 1;
                }
                Err(err) => failed_agents.push(AgentRemovalFailure { agent_id: agent.id, error: err.to_string() }),
            }
        }

        Ok(RemovalResult {
            total_agents,
            processed_agents,
            failed_agents: failed_agents.clone(),
            messages_removed_total,
            success: failed_agents.is_empty(),
        })
    }

    async fn remove_messages_from_one_agent(
        &self,
        world_id: &str,
        agent_id: &str,
        message_id: &str,
        chat_id: &str,
    ) -> Result<usize, WorldError> {
        let memory = self.storage.load_agent_memory(world_id, agent_id).await?;
        let target_created_at = memory.iter().find(|m| m.message_id == message_id).map(|m| m.created_at);

        let Some(target_created_at) = target_created_at else {
            return Ok(0);
        };

        let before = memory.len();
        let retained: Vec<AgentMessage> = memory
            .into_iter()
            .filter(|m| !(m.chat_id.as_deref() == Some(chat_id) && m.created_at >= target_created_at))
            .collect();
        let removed = before - retained.len();
        if removed > 0 {
            self.storage.save_agent_memory(world_id, agent_id, retained).await?;
        }
        Ok(removed)
    }

    /// Full edit pipeline (spec §4.9): reject mid-stream, verify the target
    /// is a user message in this chat, remove from it forward, then
    /// conditionally resubmit.
    pub async fn edit_user_message(
        &self,
        world: &World,
        message_id: &str,
        new_content: &str,
        chat_id: &str,
    ) -> Result<EditResult, WorldError> {
        if world.is_processing {
            return Err(WorldError::ProcessingInProgress { chat_id: chat_id.to_string() });
        }

        let agents = self.storage.list_agents(&world.id).await?;
        let mut target: Option<AgentMessage> = None;
        for agent in &agents {
            let memory = self.storage.load_agent_memory(&world.id, &agent.id).await?;
            if let Some(m) = memory
                .into_iter()
                .find(|m| m.message_id == message_id && m.role == MessageRole::User && m.chat_id.as_deref() == Some(chat_id))
            {
                target = Some(m);
                break;
            }
        }
        let Some(target) = target else {
            return Err(WorldError::MessageNotFound { message_id: message_id.to_string() });
        };

        let removal = self.remove_messages_from(&world.id, message_id, chat_id).await?;
        let _ = new_content;

        let (status, error) = if world.current_chat_id.as_deref() != Some(chat_id) {
            let reason = if world.current_chat_id.is_none() {
                "Session mode is OFF".to_string()
            } else {
                "Cannot resubmit: chatId does not match current chat".to_string()
            };
            (ResubmissionStatus::Skipped, Some(reason))
        } else {
            // The caller (C11) performs the actual resubmit: it publishes
            // `new_content` under `original_sender` and fills in the real
            // message id this engine has no bus access to produce.
            (ResubmissionStatus::Success, None)
        };

        Ok(EditResult {
            removal,
            message_id: None,
            resubmission_status: status,
            resubmission_error: error,
            original_sender: target.sender,
        })
    }

    /// Assigns a fresh `messageId` to every memory entry lacking one;
    /// idempotent (spec §4.9).
    pub async fn migrate_message_ids(&self, world_id: &str) -> Result<usize, WorldError> {
        let agents = self.storage.list_agents(world_id).await?;
        let mut assigned = 0;

        for agent in agents {
            let mut memory = self.storage.load_agent_memory(world_id, &agent.id).await?;
            let mut changed = false;
            for entry in memory.iter_mut() {
                if entry.message_id.is_empty() {
                    entry.message_id = Uuid::new_v4().to_string();
                    assigned += 1;
                    changed = true;
                }
            }
            if changed {
                self.storage.save_agent_memory(world_id, &agent.id, memory).await?;
            }
        }

        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;
    use crate::storage::memory::InMemoryStorage;

    fn world(current_chat_id: Option<&str>, is_processing: bool) -> World {
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
            variables: String::new(),
            is_processing,
            created_at: 0,
            last_updated: 0,
        }
    }

    fn agent(world_id: &str) -> Agent {
        Agent {
            id: "a1".into(),
            name: "a1".into(),
            agent_type: "assistant".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            system_prompt: String::new(),
            temperature: None,
            max_tokens: None,
            auto_reply: false,
            llm_call_count: 0,
            last_active: None,
            last_llm_call: None,
            world_id: world_id.to_string(),
        }
    }

    fn message(id: &str, role: MessageRole, chat_id: &str, created_at: i64) -> AgentMessage {
        AgentMessage {
            message_id: id.into(),
            agent_id: "a1".into(),
            role,
            content: "x".into(),
            sender: Some("human".into()),
            chat_id: Some(chat_id.into()),
            created_at,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[tokio::test]
    async fn rejects_edit_while_processing() {
        let storage = Arc::new(InMemoryStorage::new());
        let engine = EditEngine::new(storage);
        let world = world(Some("c1"), true);

        let result = engine.edit_user_message(&world, "m1", "new", "c1").await;
        assert!(matches!(result, Err(WorldError::ProcessingInProgress { .. })));
    }

    #[tokio::test]
    async fn remove_messages_from_drops_entries_at_or_after_target() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.save_agent(&agent("w1")).await.unwrap();
        storage
            .save_agent_memory(
                "w1",
                "a1",
                vec![
                    message("u1", MessageRole::User, "c1", 1),
                    message("a1'", MessageRole::Assistant, "c1", 2),
                    message("u2", MessageRole::User, "c1", 3),
                ],
            )
            .await
            .unwrap();
        let engine = EditEngine::new(storage.clone());

        let result = engine.remove_messages_from("w1", "a1'", "c1").await.unwrap();
        assert_eq!(result.messages_removed_total, 2);

        let remaining = storage.load_agent_memory("w1", "a1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, "u1");
    }

    #[tokio::test]
    async fn edit_skips_resubmission_when_chat_is_not_current() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.save_agent(&agent("w1")).await.unwrap();
        storage
            .save_agent_memory("w1", "a1", vec![message("u1", MessageRole::User, "c1", 1)])
            .await
            .unwrap();
        let engine = EditEngine::new(storage);
        let world = world(Some("other-chat"), false);

        let result = engine.edit_user_message(&world, "u1", "new", "c1").await.unwrap();
        assert_eq!(result.resubmission_status, ResubmissionStatus::Skipped);
        assert!(result.message_id.is_none());
    }

    #[tokio::test]
    async fn edit_allows_resubmission_when_chat_is_current() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.save_agent(&agent("w1")).await.unwrap();
        storage
            .save_agent_memory("w1", "a1", vec![message("u1", MessageRole::User, "c1", 1)])
            .await
            .unwrap();
        let engine = EditEngine::new(storage);
        let world = world(Some("c1"), false);

        let result = engine.edit_user_message(&world, "u1", "new", "c1").await.unwrap();
        assert_eq!(result.resubmission_status, ResubmissionStatus::Success);
        // The engine itself never fabricates an id or publishes anything —
        // that's WorldHandle::edit_user_message's job once status is Success.
        assert!(result.message_id.is_none());
        assert_eq!(result.original_sender.as_deref(), Some("human"));
    }

    #[tokio::test]
    async fn migrate_message_ids_is_idempotent() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.save_agent(&agent("w1")).await.unwrap();
        let mut missing_id = message("will-be-replaced", MessageRole::User, "c1", 1);
        missing_id.message_id = String::new();
        storage.save_agent_memory("w1", "a1", vec![missing_id]).await.unwrap();

        let engine = EditEngine::new(storage);
        let first = engine.migrate_message_ids("w1").await.unwrap();
        let second = engine.migrate_message_ids("w1").await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }
}
