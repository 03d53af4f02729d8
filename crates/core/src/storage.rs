//! Narrow persistence contract (spec §4.2, §6, C2).
//!
//! Grounded in `querymt_agent::session`'s storage-backend split (the teacher
//! ships a SQL-backed session store behind a trait), narrowed to the
//! operation set spec.md actually names. `memory::InMemoryStorage` is the
//! only backend this crate ships (SPEC_FULL §10.4) — a file-tree or embedded
//! SQL backend is an adapter concern outside the core, per §6.

use async_trait::async_trait;

use crate::error::WorldError;
use crate::model::{Agent, AgentMessage, Chat, World};

/// The only narrow bridge outward to persistence (spec §6). All operations
/// are async and fail with `WorldError::Storage`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_world(&self, world: &World) -> Result<(), WorldError>;
    async fn load_world(&self, world_id: &str) -> Result<Option<World>, WorldError>;
    async fn delete_world(&self, world_id: &str) -> Result<(), WorldError>;
    async fn list_worlds(&self) -> Result<Vec<World>, WorldError>;

    async fn save_agent(&self, agent: &Agent) -> Result<(), WorldError>;
    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, WorldError>;
    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError>;
    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, WorldError>;

    /// Atomic per-agent memory replace (spec §4.2: concurrent saves to the
    /// same agent serialize; last-writer-wins is acceptable but must never
    /// produce a partial write).
    async fn save_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: Vec<AgentMessage>,
    ) -> Result<(), WorldError>;
    async fn load_agent_memory(&self, world_id: &str, agent_id: &str) -> Result<Vec<AgentMessage>, WorldError>;

    async fn save_chat_data(&self, chat: &Chat) -> Result<(), WorldError>;
    async fn load_chat_data(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, WorldError>;
    async fn delete_chat_data(&self, world_id: &str, chat_id: &str) -> Result<(), WorldError>;
    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError>;
    async fn update_chat_data(&self, chat: &Chat) -> Result<(), WorldError> {
        self.save_chat_data(chat).await
    }
}

pub mod memory {
    //! In-memory `Storage` backend (SPEC_FULL §10.4), used by the crate's own
    //! tests and suitable as a default for callers with no persistence need.

    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[derive(Default)]
    struct State {
        worlds: HashMap<String, World>,
        agents: HashMap<(String, String), Agent>,
        memories: HashMap<(String, String), Vec<AgentMessage>>,
        chats: HashMap<(String, String), Chat>,
    }

    #[derive(Default)]
    pub struct InMemoryStorage {
        state: RwLock<State>,
    }

    impl InMemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Storage for InMemoryStorage {
        async fn save_world(&self, world: &World) -> Result<(), WorldError> {
            self.state.write().worlds.insert(world.id.clone(), world.clone());
            Ok(())
        }

        async fn load_world(&self, world_id: &str) -> Result<Option<World>, WorldError> {
            Ok(self.state.read().worlds.get(world_id).cloned())
        }

        async fn delete_world(&self, world_id: &str) -> Result<(), WorldError> {
            // Cascade: agents, their memories, and chats all go with the world
            // (spec §4.2, §8 universal invariant on chat deletion).
            let mut state = self.state.write();
            state.worlds.remove(world_id);
            state.agents.retain(|(w, _), _| w != world_id);
            state.memories.retain(|(w, _), _| w != world_id);
            state.chats.retain(|(w, _), _| w != world_id);
            Ok(())
        }

        async fn list_worlds(&self) -> Result<Vec<World>, WorldError> {
            Ok(self.state.read().worlds.values().cloned().collect())
        }

        async fn save_agent(&self, agent: &Agent) -> Result<(), WorldError> {
            self.state.write().agents.insert((agent.world_id.clone(), agent.id.clone()), agent.clone());
            Ok(())
        }

        async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, WorldError> {
            Ok(self.state.read().agents.get(&(world_id.to_string(), agent_id.to_string())).cloned())
        }

        async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError> {
            let key = (world_id.to_string(), agent_id.to_string());
            let mut state = self.state.write();
            state.agents.remove(&key);
            state.memories.remove(&key);
            Ok(())
        }

        async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, WorldError> {
            Ok(self.state.read().agents.iter().filter(|((w, _), _)| w == world_id).map(|(_, a)| a.clone()).collect())
        }

        async fn save_agent_memory(
            &self,
            world_id: &str,
            agent_id: &str,
            memory: Vec<AgentMessage>,
        ) -> Result<(), WorldError> {
            self.state.write().memories.insert((world_id.to_string(), agent_id.to_string()), memory);
            Ok(())
        }

        async fn load_agent_memory(&self, world_id: &str, agent_id: &str) -> Result<Vec<AgentMessage>, WorldError> {
            Ok(self
                .state
                .read()
                .memories
                .get(&(world_id.to_string(), agent_id.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn save_chat_data(&self, chat: &Chat) -> Result<(), WorldError> {
            self.state.write().chats.insert((chat.world_id.clone(), chat.id.clone()), chat.clone());
            Ok(())
        }

        async fn load_chat_data(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, WorldError> {
            Ok(self.state.read().chats.get(&(world_id.to_string(), chat_id.to_string())).cloned())
        }

        async fn delete_chat_data(&self, world_id: &str, chat_id: &str) -> Result<(), WorldError> {
            let key = (world_id.to_string(), chat_id.to_string());
            let mut state = self.state.write();
            state.chats.remove(&key);
            for memory in state.memories.values_mut() {
                memory.retain(|m| m.chat_id.as_deref() != Some(chat_id));
            }
            Ok(())
        }

        async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError> {
            let mut chats: Vec<Chat> =
                self.state.read().chats.iter().filter(|((w, _), _)| w == world_id).map(|(_, c)| c.clone()).collect();
            chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(chats)
        }
    }

}
