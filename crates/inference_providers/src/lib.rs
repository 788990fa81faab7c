//! Inference providers crate for streaming chat completions
//!
//! This crate provides a streaming-first trait interface for model backends.
//! All completion calls return streams of chunks rather than complete responses,
//! so callers can forward text as soon as it is generated.
//!
//! # Usage
//!
//! ```rust,ignore
//! use inference_providers::{ChatCompletionParams, ChatMessage, InferenceProvider};
//! use futures_util::StreamExt;
//!
//! async fn example<P: InferenceProvider>(provider: P) -> Result<(), CompletionError> {
//!     let params = ChatCompletionParams::new("my-model", vec![ChatMessage::user("Hi")]);
//!
//!     let mut stream = provider.chat_completion_stream(params).await?;
//!     while let Some(chunk) = stream.next().await {
//!         if let Some(delta) = chunk?.choices.first().and_then(|c| c.delta.as_ref()) {
//!             println!("Delta content: {:?}", delta.content);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunk_builder;
pub mod mock;
pub mod models;
pub mod openai_compatible;
pub mod sse_parser;

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

// Re-export commonly used types for convenience
pub use mock::{MockProvider, RequestMatcher, ResponseTemplate};
pub use models::{
    ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatDelta, ChatMessage,
    CompletionError, FinishReason, FunctionCall, FunctionCallDelta, FunctionChoice,
    FunctionDefinition, MessageRole, StreamOptions, TokenUsage, ToolCall, ToolCallDelta,
    ToolChoice, ToolDefinition,
};
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};

/// Type alias for streaming completion results
pub type StreamingResult =
    Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, CompletionError>> + Send>>;

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Performs a streaming chat completion request
    ///
    /// Returns a stream of chunks that can be processed incrementally.
    /// Errors returned here happen before any chunk was produced.
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError>;
}
