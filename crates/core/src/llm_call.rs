//! Unified LLM call coordination with retry and Ollama tool-gating (spec
//! §4.4, §4.7 failure semantics, C5).
//!
//! Grounded in `querymt_agent`'s provider-call retry loop, adapted onto
//! `agentworld_llm::LLMProvider` directly rather than through a plugin
//! registry: the core never needs more than one active provider per call.

use std::time::Duration;

use agentworld_llm::{GenerateRequest, LLMProvider, LLMResponse, StreamChunk, Tool};
use futures::StreamExt;

use crate::error::WorldError;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether `tools` should be attached to the outgoing request (spec §4.4):
/// omitted for "ollama" unless `ENABLE_OLLAMA_TOOLS` is truthy. Read at
/// point-of-use, never cached, so a runtime env change takes effect on the
/// next call (spec §9).
pub fn should_attach_tools(provider_name: &str, tools_available: bool) -> bool {
    if !tools_available {
        return false;
    }
    if !provider_name.eq_ignore_ascii_case("ollama") {
        return true;
    }
    std::env::var("ENABLE_OLLAMA_TOOLS").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn attach_tools(mut request: GenerateRequest, provider_name: &str, tools: Vec<Tool>) -> GenerateRequest {
    if should_attach_tools(provider_name, !tools.is_empty()) {
        request = request.with_tools(tools);
    }
    request
}

/// Backoff delay for retry attempt `attempt` (0-indexed), jittered ±20%
/// (spec §4.7).
fn backoff_delay(attempt: u32, jitter_fraction: f64) -> Duration {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let jitter = 1.0 + (jitter_fraction * 2.0 - 1.0) * 0.2;
    Duration::from_millis((base as f64 * jitter) as u64)
}

/// Non-streaming call with retry on transient provider errors (spec §4.7
/// failure semantics): up to 3 retries, exponential backoff from 500ms,
/// jittered. 401/403-class errors are fatal and never retried.
pub async fn call_with_retry(
    provider: &dyn LLMProvider,
    model: &str,
    mut request: GenerateRequest,
    tools: Vec<Tool>,
) -> Result<LLMResponse, WorldError> {
    request = attach_tools(request, provider.name(), tools);

    let mut attempt = 0;
    loop {
        match provider.generate(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                let jitter = pseudo_jitter(attempt);
                tokio::time::sleep(backoff_delay(attempt, jitter)).await;
                attempt += 1;
                let _ = model;
            }
            Err(err) => return Err(WorldError::Provider(err)),
        }
    }
}

/// Deterministic, non-cryptographic jitter source so retry timing doesn't
/// depend on a forbidden `Math.random()`-equivalent; varies by attempt only.
fn pseudo_jitter(attempt: u32) -> f64 {
    ((attempt as f64 * 0.37) % 1.0).abs()
}

/// Streaming call with the same retry policy as [`call_with_retry`],
/// invoking `on_chunk` for every chunk observed (spec §4.3, §4.7 step 4: the
/// caller emits `sse:chunk` per chunk and `sse:end` on completion). Once any
/// chunk of an attempt has been delivered to `on_chunk`, a mid-stream error
/// is no longer retried — re-establishing the call would re-emit chunks
/// already surfaced to observers.
pub async fn call_streaming_with_retry(
    provider: &dyn LLMProvider,
    model: &str,
    mut request: GenerateRequest,
    tools: Vec<Tool>,
    mut on_chunk: impl FnMut(&StreamChunk),
) -> Result<LLMResponse, WorldError> {
    request = attach_tools(request, provider.name(), tools);
    let _ = model;

    let mut attempt = 0;
    loop {
        let mut stream = match provider.stream(request.clone()).await {
            Ok(stream) => stream,
            Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                let jitter = pseudo_jitter(attempt);
                tokio::time::sleep(backoff_delay(attempt, jitter)).await;
                attempt += 1;
                continue;
            }
            Err(err) => return Err(WorldError::Provider(err)),
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut chunk_seen = false;
        let mut retry_stream = false;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    chunk_seen = true;
                    on_chunk(&chunk);
                    match chunk {
                        StreamChunk::Text(delta) => text.push_str(&delta),
                        StreamChunk::ToolUseComplete { tool_call, .. } => tool_calls.push(tool_call),
                        StreamChunk::Done { .. } => return Ok(aggregate_stream(text, tool_calls)),
                        _ => {}
                    }
                }
                Err(err) if err.is_transient() && !chunk_seen && attempt < MAX_RETRIES => {
                    let jitter = pseudo_jitter(attempt);
                    tokio::time::sleep(backoff_delay(attempt, jitter)).await;
                    attempt += 1;
                    retry_stream = true;
                    break;
                }
                Err(err) => return Err(WorldError::Provider(err)),
            }
        }

        if retry_stream {
            continue;
        }
        return Ok(aggregate_stream(text, tool_calls));
    }
}

/// Collapses a finished stream's accumulated text/tool-call chunks into the
/// same [`LLMResponse`] shape [`call_with_retry`] returns, so callers branch
/// on one type regardless of which path produced it.
fn aggregate_stream(text: String, tool_calls: Vec<agentworld_llm::ToolCall>) -> LLMResponse {
    if tool_calls.is_empty() {
        LLMResponse::Text { content: text }
    } else {
        LLMResponse::ToolCalls { tool_calls, content: if text.is_empty() { None } else { Some(text) } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentworld_llm::{ChatMessage, LLMError};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FlakyProvider {
        name: String,
        failures_remaining: Arc<Mutex<u32>>,
        fatal: bool,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }
        fn supports_tools(&self, _model: &str) -> bool {
            true
        }
        async fn generate(&self, _request: GenerateRequest) -> Result<LLMResponse, LLMError> {
            let mut remaining = self.failures_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                if self.fatal {
                    return Err(LLMError::Auth("bad key".into()));
                }
                return Err(LLMError::RateLimited { message: "slow down".into(), retry_after_ms: Some(1) });
            }
            Ok(LLMResponse::text("ok"))
        }
        async fn stream(
            &self,
            _request: GenerateRequest,
        ) -> Result<BoxStream<'static, Result<agentworld_llm::StreamChunk, LLMError>>, LLMError> {
            unimplemented!()
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new("gpt-4o", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let provider = FlakyProvider { name: "openai".into(), failures_remaining: Arc::new(Mutex::new(2)), fatal: false };
        let result = call_with_retry(&provider, "gpt-4o", request(), vec![]).await.unwrap();
        match result {
            LLMResponse::Text { content } => assert_eq!(content, "ok"),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn does_not_retry_fatal_auth_errors() {
        let provider = FlakyProvider { name: "openai".into(), failures_remaining: Arc::new(Mutex::new(1)), fatal: true };
        let result = call_with_retry(&provider, "gpt-4o", request(), vec![]).await;
        assert!(matches!(result, Err(WorldError::Provider(LLMError::Auth(_)))));
    }

    #[test]
    fn ollama_omits_tools_without_env_flag() {
        // SAFETY: no other test reads ENABLE_OLLAMA_TOOLS concurrently.
        unsafe {
            std::env::remove_var("ENABLE_OLLAMA_TOOLS");
        }
        assert!(!should_attach_tools("ollama", true));
    }

    #[test]
    fn ollama_attaches_tools_when_env_flag_set() {
        // SAFETY: test-local env mutation, restored immediately after.
        unsafe {
            std::env::set_var("ENABLE_OLLAMA_TOOLS", "1");
        }
        assert!(should_attach_tools("ollama", true));
        unsafe {
            std::env::remove_var("ENABLE_OLLAMA_TOOLS");
        }
    }

    #[test]
    fn non_ollama_providers_always_attach_available_tools() {
        assert!(should_attach_tools("openai", true));
    }

    #[test]
    fn no_tools_available_means_nothing_attached() {
        assert!(!should_attach_tools("openai", false));
    }

    struct StreamingProvider {
        name: String,
        chunks: Vec<agentworld_llm::StreamChunk>,
    }

    #[async_trait]
    impl LLMProvider for StreamingProvider {
        fn name(&self) -> &str {
            &self.name
        }
        fn supports_tools(&self, _model: &str) -> bool {
            true
        }
        async fn generate(&self, _request: GenerateRequest) -> Result<LLMResponse, LLMError> {
            unimplemented!()
        }
        async fn stream(
            &self,
            _request: GenerateRequest,
        ) -> Result<BoxStream<'static, Result<agentworld_llm::StreamChunk, LLMError>>, LLMError> {
            let items: Vec<Result<agentworld_llm::StreamChunk, LLMError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn streaming_call_aggregates_text_chunks_and_invokes_callback() {
        use agentworld_llm::StreamChunk;

        let provider = StreamingProvider {
            name: "openai".into(),
            chunks: vec![
                StreamChunk::Text("hel".into()),
                StreamChunk::Text("lo".into()),
                StreamChunk::Done { stop_reason: "stop".into() },
            ],
        };

        let mut seen = Vec::new();
        let result = call_streaming_with_retry(&provider, "gpt-4o", request(), vec![], |chunk| {
            seen.push(format!("{:?}", chunk));
        })
        .await
        .unwrap();

        assert_eq!(seen.len(), 3);
        match result {
            LLMResponse::Text { content } => assert_eq!(content, "hello"),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn streaming_call_aggregates_tool_calls_from_complete_chunks() {
        use agentworld_llm::{FunctionCall, StreamChunk, ToolCall};

        let tool_call = ToolCall { id: "call_1".into(), call_type: "function".into(), function: FunctionCall { name: "read_file".into(), arguments: "{}".into() } };
        let provider = StreamingProvider {
            name: "openai".into(),
            chunks: vec![
                StreamChunk::ToolUseStart { index: 0, id: "call_1".into(), name: "read_file".into() },
                StreamChunk::ToolUseComplete { index: 0, tool_call: tool_call.clone() },
                StreamChunk::Done { stop_reason: "tool_calls".into() },
            ],
        };

        let result = call_streaming_with_retry(&provider, "gpt-4o", request(), vec![], |_| {}).await.unwrap();
        match result {
            LLMResponse::ToolCalls { tool_calls, .. } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].id, "call_1");
            }
            _ => panic!("expected tool_calls"),
        }
    }
}
