//! Agent Subscriber: mention routing, turn accounting, and the per-turn LLM
//! + tool pipeline (spec §4.7, C7).
//!
//! Grounded in `querymt_agent::agent`'s subscribe-and-react loop, replacing
//! its remote-mesh delegation with the spec's paragraph-mention routing and
//! turn-limit bookkeeping. The tool-continuation loop mirrors the teacher's
//! bounded re-invocation pattern in `agent::run_turn`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentworld_llm::{ChatMessage, LLMProvider, LLMResponse, StreamChunk, ToolCall};
use parking_lot::Mutex;

use crate::config::streaming_enabled;
use crate::error::WorldError;
use crate::event_bus::EventBus;
use crate::events::{EventKind, SseEventType, SystemEventType, ToolEventType};
use crate::ids::to_kebab_case;
use crate::llm_call::{self, DEFAULT_LLM_TIMEOUT};
use crate::message_prep::{filter_client_side_messages, prepare_messages_for_llm};
use crate::model::{Agent, AgentMessage, MessageRole, World};
use crate::tools::{ToolContext, ToolRegistry};

const TOOL_CONTINUATION_LIMIT: u32 = 8;
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// The first paragraph of `content` (spec §4.7): text up to the first blank
/// line, keeping every line in between — a mention can appear on any line of
/// that paragraph, not just its first.
fn first_paragraph(content: &str) -> &str {
    content.split("\n\n").next().unwrap_or(content)
}

/// A paragraph-beginning mention is `@[A-Za-z0-9_-]+` sitting at
/// start-of-string or right after a newline (spec §4.7): the leading run of
/// `@token` words on each line of the first paragraph, stopping at the first
/// non-mention token on that line.
fn extract_mentions(content: &str) -> HashSet<String> {
    let mut mentions = HashSet::new();
    for line in first_paragraph(content).lines() {
        for token in line.split_whitespace() {
            let Some(raw) = token.strip_prefix('@') else {
                break;
            };
            let mention = to_kebab_case(raw.trim_matches(|c: char| !c.is_alphanumeric()));
            if !mention.is_empty() {
                mentions.insert(mention);
            }
        }
    }
    mentions
}

/// Whether `agent` should respond to `incoming` in `world` (spec §4.7,
/// §8 scenario 2), independent of turn-limit state.
pub fn should_respond(agent: &Agent, world: &World, incoming: &AgentMessage) -> bool {
    if incoming.sender.as_deref() == Some(agent.id.as_str()) || incoming.agent_id == agent.id {
        return false;
    }

    let mentions = extract_mentions(&incoming.content);
    if !mentions.is_empty() {
        let agent_key = to_kebab_case(&agent.name);
        let agent_id_key = to_kebab_case(&agent.id);
        return mentions.contains(&agent_key) || mentions.contains(&agent_id_key);
    }

    let sender_is_human = incoming.sender.as_deref() == Some("human") || incoming.sender.is_none();
    let sender_is_agent = !sender_is_human;

    // Open Question (b): suppress agent→agent auto-reply loops unless an
    // explicit paragraph-start mention targeted this agent (handled above).
    if sender_is_agent {
        return false;
    }

    agent.auto_reply || (sender_is_human && world.main_agent.as_deref() == Some(agent.id.as_str()))
}

/// Per-(world,chat) turn counter (spec §4.7): increments on every non-human
/// message, resets on a human message, caps replies at `world.turn_limit`.
#[derive(Default)]
pub struct TurnTracker {
    counts: Mutex<HashMap<(String, String), u32>>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(world_id: &str, chat_id: &str) -> (String, String) {
        (world_id.to_string(), chat_id.to_string())
    }

    /// Record a message and return the updated count for non-human senders;
    /// human messages reset the counter to 0.
    pub fn record(&self, world_id: &str, chat_id: &str, sender_is_human: bool) -> u32 {
        let mut counts = self.counts.lock();
        let entry = counts.entry(Self::key(world_id, chat_id)).or_insert(0);
        if sender_is_human {
            *entry = 0;
        } else {
            *entry += 1;
        }
        *entry
    }

    pub fn current(&self, world_id: &str, chat_id: &str) -> u32 {
        *self.counts.lock().get(&Self::key(world_id, chat_id)).unwrap_or(&0)
    }
}

fn now_ts() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn fresh_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct AgentSubscriber {
    bus: Arc<EventBus>,
    tools: Arc<ToolRegistry>,
    turns: Arc<TurnTracker>,
}

impl AgentSubscriber {
    pub fn new(bus: Arc<EventBus>, tools: Arc<ToolRegistry>, turns: Arc<TurnTracker>) -> Self {
        Self { bus, tools, turns }
    }

    /// Run one full turn for `agent` reacting to `incoming` (spec §4.7
    /// steps 1-7). `memory` is the agent's full ordered message list,
    /// mutated in place; callers persist it via C2 after this returns.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_turn(
        &self,
        world: &World,
        agent: &mut Agent,
        memory: &mut Vec<AgentMessage>,
        provider: &dyn LLMProvider,
        incoming: &AgentMessage,
        tool_context: &dyn ToolContext,
    ) -> Result<(), WorldError> {
        if !should_respond(agent, world, incoming) {
            return Ok(());
        }

        let chat_id = incoming.chat_id.clone();
        if let Some(chat_id) = &chat_id {
            let sender_is_human = incoming.sender.as_deref() == Some("human") || incoming.sender.is_none();
            let count = self.turns.record(&world.id, chat_id, sender_is_human);
            if !sender_is_human && count >= world.turn_limit {
                self.bus.publish(
                    &world.id,
                    EventKind::System {
                        event_type: SystemEventType::TurnLimitReached,
                        chat_id: Some(chat_id.clone()),
                        message_id: None,
                        content: None,
                        request_id: None,
                        options: None,
                    },
                );
                return Ok(());
            }
        }

        memory.push(incoming.clone());

        let current = ChatMessage::user(incoming.content.clone());
        let mut chat_history = prepare_messages_for_llm(agent, &current, memory, chat_id.as_deref());
        chat_history = filter_client_side_messages(&chat_history);

        let tool_defs = self.tools.definitions();
        let message_id = fresh_message_id();

        self.bus.publish(
            &world.id,
            EventKind::Sse {
                message_id: message_id.clone(),
                agent_name: agent.name.clone(),
                event_type: SseEventType::Start,
                content: None,
                error: None,
                chat_id: chat_id.clone(),
            },
        );

        let streaming = streaming_enabled(&world.variables);
        let mut rounds = 0;
        loop {
            let request = agentworld_llm::GenerateRequest::new(agent.model.clone(), chat_history.clone());
            let response = tokio::time::timeout(
                DEFAULT_LLM_TIMEOUT,
                self.call_llm(world, agent, &message_id, chat_id.as_deref(), provider, request, tool_defs.clone(), streaming),
            )
            .await;

            let response = match response {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    self.bus.publish(
                        &world.id,
                        EventKind::Sse {
                            message_id: message_id.clone(),
                            agent_name: agent.name.clone(),
                            event_type: SseEventType::Error,
                            content: None,
                            error: Some(err.to_string()),
                            chat_id: chat_id.clone(),
                        },
                    );
                    log::error!("llm call failed: world_id={}, agent_id={}, error={}", world.id, agent.id, err);
                    return Err(err);
                }
                Err(_) => {
                    let err = WorldError::Timeout { operation: "llm_call".to_string(), timeout_ms: DEFAULT_LLM_TIMEOUT.as_millis() as u64 };
                    self.bus.publish(
                        &world.id,
                        EventKind::Sse {
                            message_id: message_id.clone(),
                            agent_name: agent.name.clone(),
                            event_type: SseEventType::Error,
                            content: None,
                            error: Some(err.to_string()),
                            chat_id: chat_id.clone(),
                        },
                    );
                    return Err(err);
                }
            };

            agent.llm_call_count += 1;
            agent.last_llm_call = Some(now_ts());

            match response {
                LLMResponse::Text { content } => {
                    self.bus.publish(
                        &world.id,
                        EventKind::Sse {
                            message_id: message_id.clone(),
                            agent_name: agent.name.clone(),
                            event_type: SseEventType::End,
                            content: Some(content.clone()),
                            error: None,
                            chat_id: chat_id.clone(),
                        },
                    );

                    let assistant_message = AgentMessage {
                        message_id: message_id.clone(),
                        agent_id: agent.id.clone(),
                        role: MessageRole::Assistant,
                        content: content.clone(),
                        sender: Some(agent.id.clone()),
                        chat_id: chat_id.clone(),
                        created_at: now_ts(),
                        tool_call_id: None,
                        tool_calls: None,
                    };
                    memory.push(assistant_message);

                    self.bus.publish(
                        &world.id,
                        EventKind::Message {
                            message_id,
                            sender: agent.id.clone(),
                            content,
                            chat_id,
                            role: Some("assistant".to_string()),
                        },
                    );
                    break;
                }
                LLMResponse::ToolCalls { tool_calls, content: _ } => {
                    if tool_calls.is_empty() {
                        // Spec §8 scenario 6: invalid-only tool_use is a no-op turn.
                        self.bus.publish(
                            &world.id,
                            EventKind::Sse {
                                message_id: message_id.clone(),
                                agent_name: agent.name.clone(),
                                event_type: SseEventType::End,
                                content: None,
                                error: None,
                                chat_id: chat_id.clone(),
                            },
                        );
                        break;
                    }

                    if rounds >= TOOL_CONTINUATION_LIMIT {
                        break;
                    }
                    rounds += 1;

                    let assistant_message = AgentMessage {
                        message_id: fresh_message_id(),
                        agent_id: agent.id.clone(),
                        role: MessageRole::Assistant,
                        content: String::new(),
                        sender: Some(agent.id.clone()),
                        chat_id: chat_id.clone(),
                        created_at: now_ts(),
                        tool_call_id: None,
                        tool_calls: Some(tool_calls.clone()),
                    };
                    chat_history.push(ChatMessage::assistant_tool_calls(tool_calls.clone()));
                    memory.push(assistant_message);

                    for call in &tool_calls {
                        let result = self.dispatch_tool(&world.id, chat_id.as_deref(), call, tool_context).await;
                        let result_text = match result {
                            Ok(text) => text,
                            Err(err) => err.to_string(),
                        };

                        chat_history.push(ChatMessage::tool(call.id.clone(), result_text.clone()));
                        memory.push(AgentMessage {
                            message_id: fresh_message_id(),
                            agent_id: agent.id.clone(),
                            role: MessageRole::Tool,
                            content: result_text,
                            sender: None,
                            chat_id: chat_id.clone(),
                            created_at: now_ts(),
                            tool_call_id: Some(call.id.clone()),
                            tool_calls: None,
                        });
                    }
                }
            }
        }

        agent.last_active = Some(now_ts());
        Ok(())
    }

    /// Dispatches one non-streaming or streaming LLM call depending on
    /// `world.variables`'s `streaming` flag (spec §4.7 step 3). The
    /// streaming path re-emits every chunk as `sse:chunk` (spec §4.3
    /// ordering: `sse:start` ≺ `sse:chunk`* ≺ `sse:end|error`).
    #[allow(clippy::too_many_arguments)]
    async fn call_llm(
        &self,
        world: &World,
        agent: &Agent,
        message_id: &str,
        chat_id: Option<&str>,
        provider: &dyn LLMProvider,
        request: agentworld_llm::GenerateRequest,
        tool_defs: Vec<agentworld_llm::Tool>,
        streaming: bool,
    ) -> Result<LLMResponse, WorldError> {
        if !streaming {
            return llm_call::call_with_retry(provider, &agent.model, request, tool_defs).await;
        }

        llm_call::call_streaming_with_retry(provider, &agent.model, request, tool_defs, |chunk| {
            if let StreamChunk::Text(delta) = chunk {
                self.bus.publish(
                    &world.id,
                    EventKind::Sse {
                        message_id: message_id.to_string(),
                        agent_name: agent.name.clone(),
                        event_type: SseEventType::Chunk,
                        content: Some(delta.clone()),
                        error: None,
                        chat_id: chat_id.map(str::to_string),
                    },
                );
            }
        })
        .await
    }

    async fn dispatch_tool(
        &self,
        world_id: &str,
        chat_id: Option<&str>,
        call: &ToolCall,
        tool_context: &dyn ToolContext,
    ) -> Result<String, WorldError> {
        self.bus.publish(
            world_id,
            EventKind::Tool {
                tool_use_id: call.id.clone(),
                tool_name: call.function.name.clone(),
                event_type: ToolEventType::ToolStart,
                input: serde_json::from_str(&call.function.arguments).ok(),
                result: None,
                error: None,
                progress: None,
                chat_id: chat_id.map(str::to_string),
            },
        );

        let tool = match self.tools.find(&call.function.name) {
            Some(tool) => tool,
            None => {
                let error = format!("tool not found: {}", call.function.name);
                self.bus.publish(
                    world_id,
                    EventKind::Tool {
                        tool_use_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        event_type: ToolEventType::ToolError,
                        input: None,
                        result: None,
                        error: Some(error.clone()),
                        progress: None,
                        chat_id: chat_id.map(str::to_string),
                    },
                );
                return Err(WorldError::ToolNotFound { name: call.function.name.clone() });
            }
        };

        let args: serde_json::Value =
            serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Object(Default::default()));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
            tool.call(args, tool_context),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                self.bus.publish(
                    world_id,
                    EventKind::Tool {
                        tool_use_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        event_type: ToolEventType::ToolResult,
                        input: None,
                        result: Some(result.clone()),
                        error: None,
                        progress: None,
                        chat_id: chat_id.map(str::to_string),
                    },
                );
                Ok(result)
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                self.bus.publish(
                    world_id,
                    EventKind::Tool {
                        tool_use_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        event_type: ToolEventType::ToolError,
                        input: None,
                        result: None,
                        error: Some(message.clone()),
                        progress: None,
                        chat_id: chat_id.map(str::to_string),
                    },
                );
                Err(WorldError::ToolExecution(message))
            }
            Err(_) => {
                let message = format!("tool call timed out: {}", call.function.name);
                self.bus.publish(
                    world_id,
                    EventKind::Tool {
                        tool_use_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        event_type: ToolEventType::ToolError,
                        input: None,
                        result: None,
                        error: Some(message.clone()),
                        progress: None,
                        chat_id: chat_id.map(str::to_string),
                    },
                );
                Err(WorldError::Timeout { operation: format!("tool:{}", call.function.name), timeout_ms: DEFAULT_TOOL_TIMEOUT_MS })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, name: &str, auto_reply: bool) -> Agent {
        Agent {
            id: id.to_string(),
            name: name.to_string(),
            agent_type: "assistant".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            system_prompt: String::new(),
            temperature: None,
            max_tokens: None,
            auto_reply,
            llm_call_count: 0,
            last_active: None,
            last_llm_call: None,
            world_id: "w1".into(),
        }
    }

    fn world(main_agent: Option<&str>) -> World {
        World {
            id: "w1".into(),
            name: "World".into(),
            description: None,
            turn_limit: 10,
            current_chat_id: Some("c1".into()),
            chat_llm_provider: None,
            chat_llm_model: None,
            main_agent: main_agent.map(str::to_string),
            mcp_config: None,
            variables: String::new(),
            is_processing: false,
            created_at: 0,
            last_updated: 0,
        }
    }

    fn human_message(content: &str) -> AgentMessage {
        AgentMessage {
            message_id: "m1".into(),
            agent_id: String::new(),
            role: MessageRole::User,
            content: content.to_string(),
            sender: Some("human".into()),
            chat_id: Some("c1".into()),
            created_at: 0,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[test]
    fn paragraph_mention_routes_to_mentioned_agent_only() {
        let alice = agent("alice", "alice", false);
        let bob = agent("bob", "bob", false);
        let world = world(None);
        let message = human_message("hi everyone\n@alice start");

        assert!(should_respond(&alice, &world, &message));
        assert!(!should_respond(&bob, &world, &message));
    }

    #[test]
    fn mention_not_at_paragraph_start_gets_no_reply() {
        let alice = agent("alice", "alice", false);
        let world = world(None);
        let message = human_message("please ask @alice about this");
        assert!(!should_respond(&alice, &world, &message));
    }

    #[test]
    fn auto_reply_agent_responds_to_human_without_mention() {
        let agent = agent("alice", "alice", true);
        let world = world(None);
        let message = human_message("hello there");
        assert!(should_respond(&agent, &world, &message));
    }

    #[test]
    fn non_auto_reply_non_main_agent_ignores_unmentioned_human_message() {
        let agent = agent("alice", "alice", false);
        let world = world(Some("bob"));
        let message = human_message("hello there");
        assert!(!should_respond(&agent, &world, &message));
    }

    #[test]
    fn main_agent_responds_to_human_without_mention() {
        let agent = agent("bob", "bob", false);
        let world = world(Some("bob"));
        let message = human_message("hello there");
        assert!(should_respond(&agent, &world, &message));
    }

    #[test]
    fn ignores_self_sent_messages() {
        let agent = agent("alice", "alice", true);
        let world = world(None);
        let mut message = human_message("hello");
        message.sender = Some("alice".into());
        assert!(!should_respond(&agent, &world, &message));
    }

    #[test]
    fn suppresses_agent_to_agent_replies_without_explicit_mention() {
        let bob = agent("bob", "bob", true);
        let world = world(None);
        let mut message = human_message("just chatting");
        message.sender = Some("alice".into());
        assert!(!should_respond(&bob, &world, &message));
    }

    #[test]
    fn agent_to_agent_mention_still_routes() {
        let bob = agent("bob", "bob", false);
        let world = world(None);
        let mut message = human_message("@bob can you check this");
        message.sender = Some("alice".into());
        assert!(should_respond(&bob, &world, &message));
    }

    #[test]
    fn turn_tracker_resets_on_human_message_and_counts_agent_messages() {
        let tracker = TurnTracker::new();
        assert_eq!(tracker.record("w1", "c1", false), 1);
        assert_eq!(tracker.record("w1", "c1", false), 2);
        assert_eq!(tracker.record("w1", "c1", true), 0);
        assert_eq!(tracker.current("w1", "c1"), 0);
    }

    struct StreamingTextProvider;

    #[async_trait::async_trait]
    impl LLMProvider for StreamingTextProvider {
        fn name(&self) -> &str {
            "openai"
        }
        fn supports_tools(&self, _model: &str) -> bool {
            true
        }
        async fn generate(&self, _request: agentworld_llm::GenerateRequest) -> Result<LLMResponse, agentworld_llm::LLMError> {
            unimplemented!("this test exercises the streaming path only")
        }
        async fn stream(
            &self,
            _request: agentworld_llm::GenerateRequest,
        ) -> Result<futures::stream::BoxStream<'static, Result<StreamChunk, agentworld_llm::LLMError>>, agentworld_llm::LLMError>
        {
            let chunks: Vec<Result<StreamChunk, agentworld_llm::LLMError>> = vec![
                Ok(StreamChunk::Text("hi ".into())),
                Ok(StreamChunk::Text("there".into())),
                Ok(StreamChunk::Done { stop_reason: "stop".into() }),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn process_turn_in_streaming_mode_emits_sse_chunk_events_in_order() {
        let bus = Arc::new(EventBus::new());
        let subscriber = AgentSubscriber::new(bus.clone(), Arc::new(crate::tools::ToolRegistry::new()), Arc::new(TurnTracker::new()));
        let mut world = world(None);
        world.variables = "streaming=true".into();
        let mut alice = agent("alice", "alice", true);
        let mut memory = Vec::new();
        let provider = StreamingTextProvider;
        let incoming = human_message("hello");
        let tool_context = crate::tools::AgentToolContext::new("w1", None);

        let mut rx = bus.subscribe();
        subscriber.process_turn(&world, &mut alice, &mut memory, &provider, &incoming, &tool_context).await.unwrap();

        let mut sse_events = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await {
            if let EventKind::Sse { event_type, .. } = event.kind {
                sse_events.push(event_type);
            }
        }

        assert_eq!(
            sse_events,
            vec![SseEventType::Start, SseEventType::Chunk, SseEventType::Chunk, SseEventType::End]
        );
        assert_eq!(memory.last().unwrap().content, "hi there");
    }
}
