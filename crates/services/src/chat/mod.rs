pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod service_helpers;

use async_trait::async_trait;
use domain::{Message, Part, Role};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use errors::ChatError;
pub use models::{OrchestratorConfig, OrchestratorState};
pub use orchestrator::StreamOrchestrator;
pub use ports::*;
pub use service_helpers::EventEmitter;

use crate::auth::User;

/// Reject conversations the orchestrator cannot continue
pub fn validate_messages(messages: &[Message]) -> Result<(), ChatError> {
    let Some(last) = messages.last() else {
        return Err(ChatError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    };
    if last.role != Role::User {
        return Err(ChatError::InvalidRequest(
            "the last message must come from the user".to_string(),
        ));
    }
    if last.text().trim().is_empty() {
        return Err(ChatError::InvalidRequest(
            "the last message must contain text".to_string(),
        ));
    }

    for (index, message) in messages.iter().enumerate() {
        match message.role {
            Role::System => {
                return Err(ChatError::InvalidRequest(format!(
                    "message {index}: system messages are not accepted"
                )))
            }
            Role::User if message.parts.iter().any(|p| matches!(p, Part::Tool(_))) => {
                return Err(ChatError::InvalidRequest(format!(
                    "message {index}: user messages may only contain text"
                )))
            }
            Role::User | Role::Assistant => {}
        }
    }
    Ok(())
}

pub struct ChatServiceImpl {
    orchestrator: Arc<StreamOrchestrator>,
}

impl ChatServiceImpl {
    pub fn new(orchestrator: Arc<StreamOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ChatServiceTrait for ChatServiceImpl {
    async fn create_chat_stream(
        &self,
        request: ChatRequest,
        user: &User,
        cancel: CancellationToken,
    ) -> Result<EventStream, ChatError> {
        validate_messages(&request.messages)?;

        let (tx, rx) = futures::channel::mpsc::unbounded();
        let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        let emitter = EventEmitter::new(tx, message_id.clone());
        let orchestrator = self.orchestrator.clone();

        let span = tracing::info_span!("chat_stream", user_id = %user.id, message_id = %message_id);
        tracing::info!(
            parent: &span,
            messages = request.messages.len(),
            "Starting chat stream"
        );

        tokio::spawn(
            async move {
                orchestrator.run(request.messages, emitter, cancel).await;
            }
            .instrument(span),
        );

        Ok(Box::pin(rx))
    }
}
