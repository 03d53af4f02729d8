//! Enhanced-string parsing and LLM-bound message filtering (spec §4.5, C4).
//!
//! Grounded in `querymt_agent::middleware`'s content-normalization step,
//! narrowed to the three pure functions the spec names. Kept deliberately
//! free of storage/bus dependencies so it can be unit tested in isolation.

use agentworld_llm::{ChatMessage, Role};
use serde_json::Value;

use crate::model::{Agent, AgentMessage, MessageRole};

/// Result of [`parse_message_content`]: either a plain message in
/// `default_role`, or a recovered tool-result envelope.
pub struct ParsedMessage {
    pub role: Role,
    pub content: String,
    pub tool_call_id: Option<String>,
}

/// Recognize the enhanced-string tool-result envelope (spec §4.5): a JSON
/// object `{"__type":"tool_result","tool_call_id":...,"content":...}`.
/// Anything else — invalid JSON, unrelated JSON, or plain text — is kept
/// verbatim under `default_role`.
pub fn parse_message_content(raw: &str, default_role: Role) -> ParsedMessage {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if obj.get("__type").and_then(Value::as_str) == Some("tool_result") {
            if let Some(tool_call_id) = obj.get("tool_call_id").and_then(Value::as_str) {
                let content = obj
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_default();
                return ParsedMessage {
                    role: Role::Tool,
                    content,
                    tool_call_id: Some(tool_call_id.to_string()),
                };
            }
        }
    }

    ParsedMessage {
        role: default_role,
        content: raw.to_string(),
        tool_call_id: None,
    }
}

/// Drop messages a real LLM call must never see: client-only tool calls and
/// their now-orphaned tool results (spec §4.5, 5-step pipeline). Does not
/// mutate `messages`.
pub fn filter_client_side_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    // Step 1+2: strip `client.`-prefixed tool_calls; drop assistant messages
    // left with none.
    let stripped: Vec<ChatMessage> = messages
        .iter()
        .filter_map(|message| {
            if message.role != Role::Assistant {
                return Some(message.clone());
            }
            match &message.tool_calls {
                None => Some(message.clone()),
                Some(calls) if calls.is_empty() => Some(message.clone()),
                Some(calls) => {
                    let kept: Vec<_> =
                        calls.iter().filter(|call| !call.function.name.starts_with("client.")).cloned().collect();
                    if kept.is_empty() {
                        None
                    } else {
                        let mut clone = message.clone();
                        clone.tool_calls = Some(kept);
                        Some(clone)
                    }
                }
            }
        })
        .collect();

    // Collect surviving assistant tool_call ids.
    let surviving_ids: std::collections::HashSet<&str> = stripped
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|call| call.id.as_str())
        .collect();

    // Step 3+4: drop tool messages without a matching id, or without one at all.
    stripped
        .into_iter()
        .filter(|message| {
            if message.role != Role::Tool {
                return true;
            }
            match &message.tool_call_id {
                Some(id) => surviving_ids.contains(id.as_str()),
                None => false,
            }
        })
        .collect()
}

fn agent_message_to_chat(message: &AgentMessage) -> ChatMessage {
    ChatMessage {
        role: match message.role {
            MessageRole::System => Role::System,
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
            MessageRole::Tool => Role::Tool,
        },
        content: message.content.clone(),
        tool_calls: message.tool_calls.clone(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Build the message list sent to the provider (spec §4.5): system prompt,
/// chat-scoped history, current message.
pub fn prepare_messages_for_llm(
    agent: &Agent,
    current_message: &ChatMessage,
    history: &[AgentMessage],
    chat_id: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if !agent.system_prompt.is_empty() {
        messages.push(ChatMessage::system(agent.system_prompt.clone()));
    }

    for entry in history {
        let included = match chat_id {
            Some(id) => entry.chat_id.as_deref() == Some(id),
            None => true,
        };
        if included {
            messages.push(agent_message_to_chat(entry));
        }
    }

    messages.push(current_message.clone());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentworld_llm::{FunctionCall, ToolCall};

    #[test]
    fn parses_tool_result_envelope() {
        let raw = r#"{"__type":"tool_result","tool_call_id":"call-1","content":"42"}"#;
        let parsed = parse_message_content(raw, Role::User);
        assert_eq!(parsed.role, Role::Tool);
        assert_eq!(parsed.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(parsed.content, "42");
    }

    #[test]
    fn falls_back_to_default_role_without_tool_call_id() {
        let raw = r#"{"__type":"tool_result","content":"42"}"#;
        let parsed = parse_message_content(raw, Role::User);
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.content, raw);
    }

    #[test]
    fn preserves_unrelated_json_verbatim() {
        let raw = r#"{"foo":"bar"}"#;
        let parsed = parse_message_content(raw, Role::User);
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.content, raw);
    }

    #[test]
    fn preserves_plain_text_verbatim() {
        let parsed = parse_message_content("hello world", Role::User);
        assert_eq!(parsed.content, "hello world");
        assert_eq!(parsed.role, Role::User);
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall { name: name.to_string(), arguments: "{}".to_string() },
        }
    }

    #[test]
    fn drops_client_side_tool_calls_and_matching_tool_message() {
        let messages = vec![
            ChatMessage::assistant_tool_calls(vec![call("c1", "client.open_file")]),
            ChatMessage::tool("c1", "ignored"),
        ];
        let filtered = filter_client_side_messages(&messages);
        assert!(filtered.is_empty());
    }

    #[test]
    fn keeps_mixed_tool_calls_dropping_only_client_side_ones() {
        let messages = vec![
            ChatMessage::assistant_tool_calls(vec![call("c1", "client.open_file"), call("c2", "shell_cmd")]),
            ChatMessage::tool("c1", "ignored"),
            ChatMessage::tool("c2", "ok"),
        ];
        let filtered = filter_client_side_messages(&messages);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(filtered[1].tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn drops_orphaned_tool_message_without_matching_assistant_call() {
        let messages = vec![ChatMessage::tool("dangling", "result")];
        let filtered = filter_client_side_messages(&messages);
        assert!(filtered.is_empty());
    }

    #[test]
    fn does_not_mutate_input() {
        let messages = vec![ChatMessage::user("hi")];
        let original_len = messages.len();
        let _ = filter_client_side_messages(&messages);
        assert_eq!(messages.len(), original_len);
    }

    fn agent() -> Agent {
        Agent {
            id: "a1".into(),
            name: "Agent".into(),
            agent_type: "assistant".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            system_prompt: "You are helpful.".into(),
            temperature: None,
            max_tokens: None,
            auto_reply: true,
            llm_call_count: 0,
            last_active: None,
            last_llm_call: None,
            world_id: "w1".into(),
        }
    }

    #[test]
    fn prepare_prepends_system_prompt_and_filters_by_chat() {
        let agent = agent();
        let history = vec![
            AgentMessage {
                message_id: "m1".into(),
                agent_id: "a1".into(),
                role: MessageRole::User,
                content: "in chat".into(),
                sender: None,
                chat_id: Some("chat-1".into()),
                created_at: 1,
                tool_call_id: None,
                tool_calls: None,
            },
            AgentMessage {
                message_id: "m2".into(),
                agent_id: "a1".into(),
                role: MessageRole::User,
                content: "other chat".into(),
                sender: None,
                chat_id: Some("chat-2".into()),
                created_at: 2,
                tool_call_id: None,
                tool_calls: None,
            },
        ];
        let current = ChatMessage::user("current");
        let prepared = prepare_messages_for_llm(&agent, &current, &history, Some("chat-1"));

        assert_eq!(prepared.len(), 3);
        assert_eq!(prepared[0].role, Role::System);
        assert_eq!(prepared[1].content, "in chat");
        assert_eq!(prepared[2].content, "current");
    }
}
