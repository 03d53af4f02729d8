//! Chat/Session Manager (spec §4.8, C8).
//!
//! Grounded in `querymt_agent::session`'s chat lifecycle operations,
//! replacing its SQL-row model with C2's `Storage` trait so the same logic
//! works against any backend.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::WorldError;
use crate::model::{AgentMessage, Chat, MessageRole, World};
use crate::storage::Storage;

pub struct SessionManager {
    storage: Arc<dyn Storage>,
}

fn now_ts() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Creates a Chat with a fresh id, sets `world.currentChatId`, persists
    /// both (spec §4.8).
    pub async fn new_chat(&self, world: &mut World) -> Result<Chat, WorldError> {
        let now = now_ts();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            world_id: world.id.clone(),
            name: "New Chat".to_string(),
            description: None,
            created_at: now,
            updated_at: now,
            message_count: 0,
            summary: None,
            tags: Vec::new(),
        };
        self.storage.save_chat_data(&chat).await?;
        world.current_chat_id = Some(chat.id.clone());
        world.last_updated = now;
        self.storage.save_world(world).await?;
        Ok(chat)
    }

    /// Validates the chat exists, sets `currentChatId` (spec §4.8).
    pub async fn restore_chat(&self, world: &mut World, chat_id: &str) -> Result<(), WorldError> {
        let chat = self
            .storage
            .load_chat_data(&world.id, chat_id)
            .await?
            .ok_or_else(|| WorldError::ChatNotFound { chat_id: chat_id.to_string() })?;
        world.current_chat_id = Some(chat.id);
        world.last_updated = now_ts();
        self.storage.save_world(world).await?;
        Ok(())
    }

    /// Removes the chat and cascades memory removal across every agent;
    /// clears `currentChatId` if it pointed at the deleted chat (spec §4.8).
    pub async fn delete_chat(&self, world: &mut World, chat_id: &str) -> Result<(), WorldError> {
        self.storage.delete_chat_data(&world.id, chat_id).await?;

        for agent in self.storage.list_agents(&world.id).await? {
            let mut memory = self.storage.load_agent_memory(&world.id, &agent.id).await?;
            let before = memory.len();
            memory.retain(|m| m.chat_id.as_deref() != Some(chat_id));
            if memory.len() != before {
                self.storage.save_agent_memory(&world.id, &agent.id, memory).await?;
            }
        }

        if world.current_chat_id.as_deref() == Some(chat_id) {
            world.current_chat_id = None;
        }
        world.last_updated = now_ts();
        self.storage.save_world(world).await?;
        Ok(())
    }

    /// Creates a new chat carrying memory copied from `source_chat_id` up to
    /// and including the target assistant message (spec §4.8, §8 scenario 5).
    pub async fn branch_chat_from_message(
        &self,
        world: &World,
        source_chat_id: &str,
        message_id: &str,
    ) -> Result<(String, usize), WorldError> {
        self.storage
            .load_chat_data(&world.id, source_chat_id)
            .await?
            .ok_or_else(|| WorldError::ChatNotFound { chat_id: source_chat_id.to_string() })?;

        let now = now_ts();
        let new_chat = Chat {
            id: Uuid::new_v4().to_string(),
            world_id: world.id.clone(),
            name: format!("Branch of {}", source_chat_id),
            description: None,
            created_at: now,
            updated_at: now,
            message_count: 0,
            summary: None,
            tags: Vec::new(),
        };
        self.storage.save_chat_data(&new_chat).await?;

        let mut copied_count = 0;
        for agent in self.storage.list_agents(&world.id).await? {
            let memory = self.storage.load_agent_memory(&world.id, &agent.id).await?;
            let in_source: Vec<&AgentMessage> =
                memory.iter().filter(|m| m.chat_id.as_deref() == Some(source_chat_id)).collect();

            let cutoff = cutoff_index(&in_source, message_id);
            let Some(cutoff) = cutoff else { continue };

            let mut copied: Vec<AgentMessage> = in_source[..=cutoff]
                .iter()
                .map(|m| {
                    let mut clone = (*m).clone();
                    clone.chat_id = Some(new_chat.id.clone());
                    clone
                })
                .collect();
            copied_count += copied.len();

            let mut existing = self.storage.load_agent_memory(&world.id, &agent.id).await?;
            existing.append(&mut copied);
            self.storage.save_agent_memory(&world.id, &agent.id, existing).await?;
        }

        Ok((new_chat.id, copied_count))
    }

    /// Returns chats sorted by `updatedAt` desc (spec §4.8).
    pub async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError> {
        self.storage.list_chats(world_id).await
    }
}

/// Finds the index in `in_source` (already filtered to one chat) of the
/// target message. If the target is not `assistant`-role, walks forward to
/// the next assistant message (spec §4.8).
fn cutoff_index(in_source: &[&AgentMessage], message_id: &str) -> Option<usize> {
    let target_index = in_source.iter().position(|m| m.message_id == message_id)?;
    if in_source[target_index].role == MessageRole::Assistant {
        return Some(target_index);
    }
    in_source[target_index..].iter().position(|m| m.role == MessageRole::Assistant).map(|offset| target_index + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;

    fn world() -> World {
        World {
            id: "w1".into(),
            name: "World".into(),
            description: None,
            turn_limit: 10,
            current_chat_id: None,
            chat_llm_provider: None,
            chat_llm_model: None,
            main_agent: None,
            mcp_config: None,
            variables: String::new(),
            is_processing: false,
            created_at: 0,
            last_updated: 0,
        }
    }

    fn message(role: MessageRole, chat_id: &str, id: &str, created_at: i64) -> AgentMessage {
        AgentMessage {
            message_id: id.into(),
            agent_id: "a1".into(),
            role,
            content: "x".into(),
            sender: None,
            chat_id: Some(chat_id.into()),
            created_at,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[tokio::test]
    async fn new_chat_sets_current_chat_id() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = SessionManager::new(storage);
        let mut world = world();

        let chat = manager.new_chat(&mut world).await.unwrap();
        assert_eq!(world.current_chat_id.as_deref(), Some(chat.id.as_str()));
    }

    #[tokio::test]
    async fn delete_chat_clears_current_chat_id_when_it_matches() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = SessionManager::new(storage);
        let mut world = world();
        let chat = manager.new_chat(&mut world).await.unwrap();

        manager.delete_chat(&mut world, &chat.id).await.unwrap();
        assert_eq!(world.current_chat_id, None);
    }

    #[tokio::test]
    async fn branch_from_message_copies_up_to_target_assistant_message() {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = SessionManager::new(storage.clone());
        let mut world = world();
        let source = manager.new_chat(&mut world).await.unwrap();

        let agent = crate::model::Agent {
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
            world_id: world.id.clone(),
        };
        storage.save_agent(&agent).await.unwrap();

        let memory = vec![
            message(MessageRole::User, &source.id, "A", 1),
            message(MessageRole::Assistant, &source.id, "A-prime", 2),
            message(MessageRole::User, &source.id, "B", 3),
            message(MessageRole::Assistant, &source.id, "B-prime", 4),
        ];
        storage.save_agent_memory(&world.id, "a1", memory).await.unwrap();

        let (new_chat_id, copied) = manager.branch_chat_from_message(&world, &source.id, "A-prime").await.unwrap();
        assert_eq!(copied, 2);

        let new_memory = storage.load_agent_memory(&world.id, "a1").await.unwrap();
        let copied_entries: Vec<_> = new_memory.iter().filter(|m| m.chat_id.as_deref() == Some(&new_chat_id)).collect();
        assert_eq!(copied_entries.len(), 2);
        assert_eq!(copied_entries[0].message_id, "A");
        assert_eq!(copied_entries[1].message_id, "A-prime");

        assert_eq!(world.current_chat_id.as_deref(), Some(source.id.as_str()));
    }
}
