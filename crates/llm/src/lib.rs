//! Unified LLM provider capability: chat message types and the
//! provider-agnostic [`LLMProvider`] trait a world calls through (spec §1:
//! concrete provider SDKs are out of scope, implemented by adapters outside
//! this repo).
//!
//! Grounded in `querymt`'s `chat`/`error` modules, trimmed of the WASM plugin
//! and chain/embedding machinery that doesn't apply here: a world only ever
//! needs to send a message list plus tool definitions and get back text,
//! tool calls, or a stream of either.

pub mod chat;
pub mod error;
pub mod provider;

pub use chat::{
    ChatMessage, FunctionCall, FunctionTool, LLMResponse, Role, StreamChunk, Tool, ToolCall, Usage,
};
pub use error::LLMError;
pub use provider::{GenerateRequest, LLMProvider};
