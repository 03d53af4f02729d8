//! World Facade (spec §4.11, C11): the public operation surface tying C1-C10
//! together.
//!
//! Grounded in `querymt_agent::agent`'s top-level handle type, which plays
//! the same "owns storage + bus, exposes a flat operation API" role the
//! teacher's `AgentHandle` plays over a single agent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::edit::{EditEngine, EditResult, ResubmissionStatus};
use crate::error::WorldError;
use crate::event_bus::EventBus;
use crate::events::EventKind;
use crate::hitl::HitlCoordinator;
use crate::ids::to_kebab_case;
use crate::model::{Agent, AgentMessage, Chat, MessageRole, World};
use crate::session::SessionManager;
use crate::storage::Storage;

fn now_ts() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Per-(world,chat) cooperative cancellation flag (spec §4.11, §5): polled
/// at each suspension point named in §5 rather than forcibly aborting tasks.
#[derive(Default)]
struct StopSignals {
    flags: HashMap<(String, String), Arc<Notify>>,
}

impl StopSignals {
    fn signal_for(&mut self, world_id: &str, chat_id: &str) -> Arc<Notify> {
        self.flags.entry((world_id.to_string(), chat_id.to_string())).or_insert_with(|| Arc::new(Notify::new())).clone()
    }
}

/// Owns a world's storage handle, bus, and the C8/C9/C10 engines built on
/// top of it. One instance per loaded world (spec §4.11, §5: one
/// cooperative task queue per world — modeled here as "one `WorldHandle`,
/// single owner of mutation").
pub struct WorldHandle {
    pub bus: Arc<EventBus>,
    storage: Arc<dyn Storage>,
    sessions: SessionManager,
    edits: EditEngine,
    pub hitl: Arc<HitlCoordinator>,
    stop_signals: parking_lot::Mutex<StopSignals>,
}

impl WorldHandle {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            sessions: SessionManager::new(storage.clone()),
            edits: EditEngine::new(storage.clone()),
            hitl: Arc::new(HitlCoordinator::new(bus.clone())),
            bus,
            storage,
            stop_signals: parking_lot::Mutex::new(StopSignals::default()),
        }
    }

    /// Creates a world, rejecting a kebab-normalized name collision
    /// (spec §4.1, §8 scenario 1).
    pub async fn create_world(&self, name: &str, turn_limit: u32) -> Result<World, WorldError> {
        let id = to_kebab_case(name);
        for existing in self.storage.list_worlds().await? {
            if to_kebab_case(&existing.name) == id {
                return Err(WorldError::WorldNameConflict { name: name.to_string() });
            }
        }

        let now = now_ts();
        let world = World {
            id,
            name: name.trim().to_string(),
            description: None,
            turn_limit,
            current_chat_id: None,
            chat_llm_provider: None,
            chat_llm_model: None,
            main_agent: None,
            mcp_config: None,
            variables: String::new(),
            is_processing: false,
            created_at: now,
            last_updated: now,
        };
        self.storage.save_world(&world).await?;
        Ok(world)
    }

    pub async fn get_world(&self, world_id: &str) -> Result<World, WorldError> {
        self.storage.load_world(world_id).await?.ok_or_else(|| WorldError::WorldNotFound { world_id: world_id.to_string() })
    }

    pub async fn list_worlds(&self) -> Result<Vec<World>, WorldError> {
        self.storage.list_worlds().await
    }

    pub async fn update_world(&self, mut world: World) -> Result<World, WorldError> {
        world.last_updated = now_ts();
        self.storage.save_world(&world).await?;
        Ok(world)
    }

    pub async fn delete_world(&self, world_id: &str) -> Result<(), WorldError> {
        self.hitl.cancel_all();
        self.storage.delete_world(world_id).await
    }

    pub async fn create_agent(
        &self,
        world_id: &str,
        name: &str,
        provider: &str,
        model: &str,
        system_prompt: &str,
    ) -> Result<Agent, WorldError> {
        let id = to_kebab_case(name);
        if self.storage.load_agent(world_id, &id).await?.is_some() {
            return Err(WorldError::WorldNameConflict { name: name.to_string() });
        }
        let agent = Agent {
            id,
            name: name.to_string(),
            agent_type: "assistant".to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            temperature: None,
            max_tokens: None,
            auto_reply: false,
            llm_call_count: 0,
            last_active: None,
            last_llm_call: None,
            world_id: world_id.to_string(),
        };
        self.storage.save_agent(&agent).await?;
        Ok(agent)
    }

    pub async fn update_agent(&self, agent: Agent) -> Result<Agent, WorldError> {
        self.storage.save_agent(&agent).await?;
        Ok(agent)
    }

    pub async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError> {
        self.storage.delete_agent(world_id, agent_id).await
    }

    /// Appends a human-authored message to the world's memory stream and
    /// returns it; actual fan-out to subscribed agents is performed by the
    /// caller driving `agent::AgentSubscriber` per subscribed agent (spec
    /// §4.7 data flow: C11 publishes, C3 broadcasts, C7 consumes).
    pub async fn publish_message(
        &self,
        world: &World,
        content: &str,
        sender: &str,
        chat_id: Option<&str>,
    ) -> AgentMessage {
        let message = AgentMessage {
            message_id: Uuid::new_v4().to_string(),
            agent_id: String::new(),
            role: MessageRole::User,
            content: content.to_string(),
            sender: Some(sender.to_string()),
            chat_id: chat_id.map(str::to_string),
            created_at: now_ts(),
            tool_call_id: None,
            tool_calls: None,
        };

        self.bus.publish(
            &world.id,
            EventKind::Message {
                message_id: message.message_id.clone(),
                sender: sender.to_string(),
                content: content.to_string(),
                chat_id: chat_id.map(str::to_string),
                role: Some("user".to_string()),
            },
        );

        message
    }

    /// Sets the per-(world,chat) stop signal (spec §4.11). §5's suspension
    /// points observe this via [`WorldHandle::stop_requested`].
    pub fn stop_message_processing(&self, world_id: &str, chat_id: &str) {
        self.stop_signals.lock().signal_for(world_id, chat_id).notify_waiters();
    }

    pub fn stop_signal(&self, world_id: &str, chat_id: &str) -> Arc<Notify> {
        self.stop_signals.lock().signal_for(world_id, chat_id)
    }

    pub async fn new_chat(&self, world: &mut World) -> Result<Chat, WorldError> {
        self.sessions.new_chat(world).await
    }

    pub async fn restore_chat(&self, world: &mut World, chat_id: &str) -> Result<(), WorldError> {
        self.sessions.restore_chat(world, chat_id).await
    }

    pub async fn delete_chat(&self, world: &mut World, chat_id: &str) -> Result<(), WorldError> {
        self.sessions.delete_chat(world, chat_id).await
    }

    pub async fn branch_chat_from_message(
        &self,
        world: &World,
        source_chat_id: &str,
        message_id: &str,
    ) -> Result<(String, usize), WorldError> {
        self.sessions.branch_chat_from_message(world, source_chat_id, message_id).await
    }

    pub async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError> {
        self.sessions.list_chats(world_id).await
    }

    /// Edits a user message and, when resubmission is allowed (spec §4.9
    /// step 5), actually publishes the edited content under the original
    /// sender and fills in the real new message id.
    pub async fn edit_user_message(
        &self,
        world: &World,
        message_id: &str,
        new_content: &str,
        chat_id: &str,
    ) -> Result<EditResult, WorldError> {
        let mut result = self.edits.edit_user_message(world, message_id, new_content, chat_id).await?;

        if result.resubmission_status == ResubmissionStatus::Success {
            let sender = result.original_sender.clone().unwrap_or_else(|| "human".to_string());
            let message = self.publish_message(world, new_content, &sender, Some(chat_id)).await;
            result.message_id = Some(message.message_id);
        }

        Ok(result)
    }

    pub async fn remove_messages_from(
        &self,
        world_id: &str,
        message_id: &str,
        chat_id: &str,
    ) -> Result<crate::edit::RemovalResult, WorldError> {
        self.edits.remove_messages_from(world_id, message_id, chat_id).await
    }

    pub async fn get_memory(&self, world_id: &str, agent_id: &str) -> Result<Vec<AgentMessage>, WorldError> {
        self.storage.load_agent_memory(world_id, agent_id).await
    }

    pub fn submit_world_option_response(&self, request_id: &str, option_id: &str) -> Result<(), WorldError> {
        self.hitl.submit_response(request_id, option_id)
    }

    /// Best-effort background migration run on world load (spec §4.11):
    /// failures are logged, never propagated.
    pub async fn migrate_message_ids_best_effort(&self, world_id: &str) {
        if let Err(err) = self.edits.migrate_message_ids(world_id).await {
            log::warn!("migrate_message_ids failed for world_id={}: {}", world_id, err);
        }
    }
}
