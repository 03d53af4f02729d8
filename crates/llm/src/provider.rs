//! The provider-agnostic capability trait (spec §4.4).
//!
//! Grounded in `querymt::chat::ToolChatProvider` / `BasicChatProvider`, but
//! collapsed to a single trait: a world never needs completion or embedding
//! capability, so there is no reason to keep the teacher's three-trait split.

use crate::chat::{ChatMessage, LLMResponse, StreamChunk, Tool};
use crate::error::LLMError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Everything a provider needs to produce a response: the full message
/// history (already trimmed/prepared by the caller per spec §4.3), the tool
/// definitions currently available to the agent, and the model name.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
}

/// A provider-agnostic chat capability.
///
/// Ollama note (spec §4.4, §7): not every locally-served Ollama model
/// supports tool calling. Implementations that can't honor `tools` on a
/// given model MUST drop them silently rather than error, matching the
/// teacher's handling of provider capability gaps in `querymt::chat`
/// (`supports_tools`-gated branches) — a caller can check
/// [`LLMProvider::supports_tools`] up front to know whether it happened.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Human-readable provider name, used in error messages and logs.
    fn name(&self) -> &str;

    /// Whether this provider (for the given model) can take tool
    /// definitions at all. The world's LLM-call step uses this to decide
    /// whether to warn when a world has tools configured but the active
    /// provider/model combination can't use them.
    fn supports_tools(&self, model: &str) -> bool;

    /// One-shot, non-streaming call.
    async fn generate(&self, request: GenerateRequest) -> Result<LLMResponse, LLMError>;

    /// Streaming call. Chunk ordering follows spec §4.3: zero or more
    /// `Text`/`ToolUseStart`/`ToolUseInputDelta` chunks, then
    /// `ToolUseComplete` per call, an optional `Usage`, and a final `Done`.
    async fn stream(
        &self,
        request: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LLMError>>, LLMError>;
}
