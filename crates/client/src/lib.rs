//! Client side of the streaming chat endpoint.
//!
//! - [`reducer`] folds server events into per-message conversation state
//! - [`presenter`] turns that state into a toolkit-independent view model
//! - [`sse`] decodes the `text/event-stream` body
//! - [`ChatClient`] ties them together over HTTP

pub mod presenter;
pub mod reducer;
pub mod sse;

pub use presenter::{
    render, render_plain, Banner, BannerKind, Block, ConversationView, ExpansionState,
    MessageView, ResultItemView, ToolCallKey, ViewModel,
};
pub use reducer::{fold, ConversationState, RequestFailure, RequestStatus, SubmitError};
pub use sse::{decode_event, EventStream, SseDecoder, SseFrame};

use domain::{FinishReason, Message, StreamEvent};
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Request failed: {0}")]
    Request(String),
    /// The server ended the stream with an `error` event
    #[error("{0}")]
    Stream(String),
    #[error("Connection interrupted: {0}")]
    Interrupted(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// HTTP status for errors the server answered before streaming
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::QuotaExceeded(_) => Some(429),
            ClientError::BadRequest(_) => Some(400),
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            401 => ClientError::Unauthorized(message),
            429 => ClientError::QuotaExceeded(message),
            400 => ClientError::BadRequest(message),
            status => ClientError::Http { status, message },
        }
    }
}

pub type ChatEventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

const INTERRUPTED_REASON: &str = "Connection closed before the answer finished";

#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    /// Send the conversation and return the decoded event stream.
    ///
    /// The stream ends early, without a terminal event, once `cancel` fires;
    /// dropping it closes the connection, which aborts the work on the server.
    pub async fn stream_events(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream, ClientError> {
        let request = self
            .http
            .post(format!("{}/v1/chat", self.base_url))
            .bearer_auth(&self.token)
            .header("accept", "text/event-stream")
            .json(&serde_json::json!({ "messages": messages }));

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = request.send() => {
                response.map_err(|e| ClientError::Request(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Chat request refused");
            return Err(ClientError::from_response(status.as_u16(), &body));
        }

        let events = EventStream::new(Box::pin(response.bytes_stream()))
            .take_until(cancel.cancelled_owned());
        Ok(events.boxed())
    }

    /// Submit one user turn and fold the answer into `view` as it arrives
    pub async fn submit(
        &self,
        view: &mut ConversationView,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<FinishReason, ClientError> {
        self.submit_observed(view, text, cancel, |_, _| {}).await
    }

    /// Like [`ChatClient::submit`], calling `observer` after every folded event
    pub async fn submit_observed<F>(
        &self,
        view: &mut ConversationView,
        text: &str,
        cancel: CancellationToken,
        mut observer: F,
    ) -> Result<FinishReason, ClientError>
    where
        F: FnMut(&StreamEvent, &ConversationView),
    {
        let messages = view.begin_submission(text)?;

        let mut events = match self.stream_events(messages, cancel.clone()).await {
            Ok(events) => events,
            Err(e) => {
                match e.status() {
                    Some(status) => view.reject(status, e.to_string()),
                    None => view.interrupt(e.to_string()),
                }
                return Err(e);
            }
        };

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    view.interrupt(e.to_string());
                    return Err(e);
                }
            };

            view.apply(&event);
            observer(&event, view);
            match event {
                StreamEvent::Done { finish_reason, .. } => return Ok(finish_reason),
                StreamEvent::Error { message, .. } => return Err(ClientError::Stream(message)),
                _ => {}
            }
        }

        if cancel.is_cancelled() {
            view.interrupt("Request cancelled");
            return Err(ClientError::Cancelled);
        }
        view.interrupt(INTERRUPTED_REASON);
        Err(ClientError::Interrupted(INTERRUPTED_REASON.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_unwrapped() {
        let err = ClientError::from_response(429, r#"{"error":"Daily request limit reached"}"#);
        assert!(matches!(err, ClientError::QuotaExceeded(ref m) if m == "Daily request limit reached"));
        assert_eq!(err.status(), Some(429));

        let err = ClientError::from_response(502, "upstream down\n");
        assert!(matches!(err, ClientError::Http { status: 502, ref message } if message == "upstream down"));
    }
}
