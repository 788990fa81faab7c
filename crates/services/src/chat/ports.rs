use async_trait::async_trait;
use domain::{Message, StreamEvent};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use super::errors::ChatError;
use crate::auth::User;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Body of a chat request: the full conversation, ending with the user's turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait ChatServiceTrait: Send + Sync {
    /// Validate the request and start streaming the assistant's answer.
    ///
    /// Cancelling `cancel` stops generation and any running tool call.
    async fn create_chat_stream(
        &self,
        request: ChatRequest,
        user: &User,
        cancel: CancellationToken,
    ) -> Result<EventStream, ChatError>;
}
