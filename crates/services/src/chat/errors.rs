use super::models::InvalidStateTransition;
use inference_providers::CompletionError;

pub const UNAVAILABLE_MESSAGE: &str =
    "The assistant is temporarily unavailable. Please try again in a moment.";
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Model call failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: CompletionError,
    },
    #[error("Model call failed: {0}")]
    Model(CompletionError),
    #[error("Request timed out")]
    RequestTimeout,
    #[error("Request was cancelled")]
    Cancelled,
    /// The receiving side of the event stream is gone
    #[error("Event stream closed")]
    StreamClosed,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ChatError {
    /// Text carried by the `error` event. Provider details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::InvalidRequest(_) => self.to_string(),
            ChatError::RequestTimeout => TIMEOUT_MESSAGE.to_string(),
            ChatError::RetriesExhausted { .. }
            | ChatError::Model(_)
            | ChatError::Cancelled
            | ChatError::StreamClosed
            | ChatError::InternalError(_) => UNAVAILABLE_MESSAGE.to_string(),
        }
    }

    /// Nobody is listening any more; end without emitting
    pub fn is_silent(&self) -> bool {
        matches!(self, ChatError::Cancelled | ChatError::StreamClosed)
    }
}

impl From<InvalidStateTransition> for ChatError {
    fn from(e: InvalidStateTransition) -> Self {
        ChatError::InternalError(e.to_string())
    }
}

impl From<domain::InvalidTransition> for ChatError {
    fn from(e: domain::InvalidTransition) -> Self {
        ChatError::InternalError(e.to_string())
    }
}
