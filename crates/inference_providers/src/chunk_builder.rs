//! Synthetic OpenAI-compatible streaming chunks
//!
//! The mock provider scripts model output as a sequence of these chunks, so tests
//! exercise the same accumulation paths as a real streaming backend.

use crate::{
    ChatChoice, ChatCompletionChunk, ChatDelta, FinishReason, FunctionCallDelta, MessageRole,
    TokenUsage, ToolCallDelta,
};

/// One piece of a scripted model step
#[derive(Debug, Clone)]
pub enum ChunkPiece {
    /// Opening chunk announcing the assistant role
    Role,
    Text(String),
    /// First fragment of a tool call, carrying its id and function name
    ToolCallStart { index: i64, id: String, name: String },
    /// A further fragment of a tool call's JSON arguments
    ToolCallArgs { index: i64, arguments: String },
    Finish {
        reason: Option<FinishReason>,
        usage: TokenUsage,
    },
}

/// Identity shared by every chunk of one streamed response
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl ChunkContext {
    pub fn new(id: String, model: String, created: i64) -> Self {
        Self { id, model, created }
    }

    pub fn chunk(&self, piece: ChunkPiece) -> ChatCompletionChunk {
        let mut delta = ChatDelta::default();
        let mut finish_reason = None;
        let mut usage = None;

        match piece {
            ChunkPiece::Role => delta.role = Some(MessageRole::Assistant),
            ChunkPiece::Text(text) => delta.content = Some(text),
            ChunkPiece::ToolCallStart { index, id, name } => {
                delta.tool_calls = Some(vec![ToolCallDelta {
                    index: Some(index),
                    id: Some(id),
                    type_: Some("function".to_string()),
                    function: Some(FunctionCallDelta {
                        name: Some(name),
                        arguments: None,
                    }),
                }]);
            }
            ChunkPiece::ToolCallArgs { index, arguments } => {
                delta.tool_calls = Some(vec![ToolCallDelta {
                    index: Some(index),
                    id: None,
                    type_: None,
                    function: Some(FunctionCallDelta {
                        name: None,
                        arguments: Some(arguments),
                    }),
                }]);
            }
            ChunkPiece::Finish {
                reason,
                usage: totals,
            } => {
                finish_reason = reason;
                usage = Some(totals);
            }
        }

        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                delta: Some(delta),
                finish_reason,
            }],
            usage,
        }
    }

    /// Chunks for a whole step, in order
    pub fn chunks(&self, pieces: impl IntoIterator<Item = ChunkPiece>) -> Vec<ChatCompletionChunk> {
        pieces.into_iter().map(|piece| self.chunk(piece)).collect()
    }
}
