//! World event orchestrator: pub/sub event bus, agent subscription and
//! turn-control, LLM call coordination, tool execution with working-
//! directory enforcement, and chat-scoped memory persistence.
//!
//! Module layout mirrors dependency order (spec §2, leaves first):
//! identifiers → storage → event bus → message prep → LLM calls → tools →
//! agent subscriber → session/edit/HITL → the world facade tying them
//! together.

pub mod agent;
pub mod config;
pub mod edit;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod hitl;
pub mod ids;
pub mod llm_call;
pub mod message_prep;
pub mod model;
pub mod session;
pub mod storage;
pub mod tools;
pub mod world;

pub use error::WorldError;
pub use event_bus::EventBus;
pub use events::{EventKind, EventObserver, WorldEvent};
pub use model::{Agent, AgentMessage, Chat, HitlOption, HitlRequest, MessageRole, World};
pub use storage::Storage;
pub use world::WorldHandle;
