//! Mock implementation of InferenceProvider for testing
//!
//! This module provides a scripted provider that streams realistic
//! OpenAI-style chunks (text word by word, tool calls in fragments)
//! without requiring a model server.

use crate::{
    chunk_builder::{ChunkContext, ChunkPiece},
    ChatCompletionChunk, ChatCompletionParams, CompletionError, FinishReason, MessageRole,
    StreamingResult, TokenUsage,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Request matcher for conditional responses
#[derive(Clone, Debug)]
pub enum RequestMatcher {
    /// Match any request
    Any,
    /// Match requests whose user and assistant text, joined by spaces, equals the prompt
    ExactPrompt(String),
    /// Match requests whose last user message contains the text
    LastUserMessageContains(String),
}

impl RequestMatcher {
    /// Check if this matcher matches the given parameters
    pub fn matches(&self, params: &ChatCompletionParams) -> bool {
        match self {
            Self::Any => true,
            Self::ExactPrompt(prompt) => Self::conversation_text(params) == *prompt,
            Self::LastUserMessageContains(needle) => params
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .and_then(|m| m.content.as_deref())
                .is_some_and(|content| content.contains(needle.as_str())),
        }
    }

    fn conversation_text(params: &ChatCompletionParams) -> String {
        params
            .messages
            .iter()
            .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
            .filter_map(|m| m.content.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug)]
struct ScriptedToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Clone, Debug)]
pub struct ResponseTemplate {
    content: String,
    tool_calls: Vec<ScriptedToolCall>,
    /// Fail the call itself before any chunk is streamed
    fail_with: Option<CompletionError>,
    /// Simulate a dropped connection after N chunks (stream ends early)
    disconnect_after_chunks: Option<usize>,
    /// Yield an error after N chunks
    error_after_chunks: Option<(usize, CompletionError)>,
    chunk_delay: Option<Duration>,
}

impl ResponseTemplate {
    /// Create a new response template with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            fail_with: None,
            disconnect_after_chunks: None,
            error_after_chunks: None,
            chunk_delay: None,
        }
    }

    /// A step that only requests one tool call
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::new("").with_tool_call(id, name, arguments)
    }

    /// A call that fails before streaming anything
    pub fn failure(error: CompletionError) -> Self {
        let mut template = Self::new("");
        template.fail_with = Some(error);
        template
    }

    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        self.tool_calls.push(ScriptedToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        });
        self
    }

    /// Tool call whose argument string is sent verbatim (may be invalid JSON)
    pub fn with_raw_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.tool_calls.push(ScriptedToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    /// Simulate disconnect after N chunks
    /// The stream will be truncated and end without the finish chunk
    pub fn with_disconnect_after(mut self, chunks: usize) -> Self {
        self.disconnect_after_chunks = Some(chunks);
        self
    }

    pub fn with_error_after(mut self, chunks: usize, error: CompletionError) -> Self {
        self.error_after_chunks = Some((chunks, error));
        self
    }

    /// Sleep before each chunk
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Generate streaming chunks from this template.
    /// Content streams word by word; tool call arguments arrive in two fragments.
    fn generate_chunks(&self, ctx: &ChunkContext, input_tokens: i32) -> Vec<ChatCompletionChunk> {
        let mut pieces = vec![ChunkPiece::Role];

        if !self.content.is_empty() {
            for (i, word) in self.content.split(' ').enumerate() {
                let text = if i == 0 {
                    word.to_string()
                } else {
                    format!(" {word}")
                };
                pieces.push(ChunkPiece::Text(text));
            }
        }

        for (index, call) in self.tool_calls.iter().enumerate() {
            let index = index as i64;
            pieces.push(ChunkPiece::ToolCallStart {
                index,
                id: call.id.clone(),
                name: call.name.clone(),
            });
            let mid = call.arguments.len() / 2;
            let split = (mid..=call.arguments.len())
                .find(|i| call.arguments.is_char_boundary(*i))
                .unwrap_or(call.arguments.len());
            let (head, tail) = call.arguments.split_at(split);
            for fragment in [head, tail].into_iter().filter(|f| !f.is_empty()) {
                pieces.push(ChunkPiece::ToolCallArgs {
                    index,
                    arguments: fragment.to_string(),
                });
            }
        }

        let words = pieces
            .iter()
            .filter(|p| matches!(p, ChunkPiece::Text(_)))
            .count();
        let output_tokens = (words + self.tool_calls.len()) as i32;
        let reason = if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        pieces.push(ChunkPiece::Finish {
            reason: Some(reason),
            usage: TokenUsage::new(input_tokens, output_tokens),
        });

        ctx.chunks(pieces)
    }
}

/// Configuration for a single expectation
struct MockExpectation {
    matcher: RequestMatcher,
    response: ResponseTemplate,
}

/// Configuration for the mock provider
struct MockConfig {
    /// Consumed in order, ahead of expectations
    queued: VecDeque<ResponseTemplate>,
    expectations: Vec<MockExpectation>,
    default_response: ResponseTemplate,
    requests: Vec<ChatCompletionParams>,
}

/// Builder for configuring a single expectation
pub struct MockExpectationBuilder {
    config: Arc<Mutex<MockConfig>>,
    matcher: RequestMatcher,
}

impl MockExpectationBuilder {
    /// Set the response for this expectation
    pub async fn respond_with(self, response: ResponseTemplate) {
        let mut config = self.config.lock().await;
        config.expectations.push(MockExpectation {
            matcher: self.matcher,
            response,
        });
    }
}

/// Mock provider that implements InferenceProvider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Configuration for conditional responses (thread-safe)
    config: Arc<Mutex<MockConfig>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            config: Arc::new(Mutex::new(MockConfig {
                queued: VecDeque::new(),
                expectations: Vec::new(),
                default_response: ResponseTemplate::new("1. 2. 3."),
                requests: Vec::new(),
            })),
        }
    }

    /// Provider that answers successive calls with the given templates
    pub fn scripted(responses: impl IntoIterator<Item = ResponseTemplate>) -> Self {
        let provider = Self::new();
        if let Ok(mut config) = provider.config.try_lock() {
            config.queued.extend(responses);
        }
        provider
    }

    /// Add a conditional response for a specific matcher
    pub fn when(&self, matcher: RequestMatcher) -> MockExpectationBuilder {
        MockExpectationBuilder {
            config: self.config.clone(),
            matcher,
        }
    }

    /// Answer the next unanswered call with this template
    pub async fn enqueue(&self, response: ResponseTemplate) {
        self.config.lock().await.queued.push_back(response);
    }

    /// Set the default response for requests that don't match any expectation
    pub async fn set_default_response(&self, response: ResponseTemplate) {
        let mut config = self.config.lock().await;
        config.default_response = response;
    }

    /// Every request received so far, in order
    pub async fn requests(&self) -> Vec<ChatCompletionParams> {
        self.config.lock().await.requests.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.config.lock().await.requests.len()
    }

    fn chunk_context(model: &str) -> ChunkContext {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        ChunkContext::new(
            format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model.to_string(),
            created,
        )
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::InferenceProvider for MockProvider {
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError> {
        let response_template = {
            let mut config = self.config.lock().await;
            config.requests.push(params.clone());
            match config.queued.pop_front() {
                Some(template) => template,
                None => config
                    .expectations
                    .iter()
                    .find(|exp| exp.matcher.matches(&params))
                    .map(|exp| exp.response.clone())
                    .unwrap_or_else(|| config.default_response.clone()),
            }
        };

        if let Some(error) = response_template.fail_with.clone() {
            return Err(error);
        }

        // Rough estimate: 1 word ≈ 1 token
        let input_tokens: i32 = params
            .messages
            .iter()
            .filter_map(|m| m.content.as_ref())
            .map(|c| c.split_whitespace().count() as i32)
            .sum();

        let ctx = Self::chunk_context(&params.model);
        let mut items: Vec<Result<ChatCompletionChunk, CompletionError>> = response_template
            .generate_chunks(&ctx, input_tokens)
            .into_iter()
            .map(Ok)
            .collect();

        if let Some(disconnect_at) = response_template.disconnect_after_chunks {
            items.truncate(disconnect_at);
        }
        if let Some((error_at, error)) = response_template.error_after_chunks.clone() {
            items.truncate(error_at);
            items.push(Err(error));
        }

        match response_template.chunk_delay {
            Some(delay) => Ok(Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(stream::iter(items))),
        }
    }
}
