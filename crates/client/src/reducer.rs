//! Folds the chat event stream into per-message state.
//!
//! The fold never discards what it has already built: a server `error` event or
//! a broken connection only changes the request status and marks the affected
//! message, leaving its text and tool parts in place.

use domain::{Message, Part, Role, StreamEvent, ToolName, ToolPart, ToolResultItem};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Why the last request did not finish normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// The server refused the request before streaming (401, 429, 400, ...)
    Rejected { status: u16, message: String },
    /// The stream ended with an `error` event
    Server { message: String },
    /// The connection ended without a terminal event, or the user aborted
    Interrupted { reason: String },
}

impl RequestFailure {
    pub fn message(&self) -> &str {
        match self {
            RequestFailure::Rejected { message, .. } | RequestFailure::Server { message } => {
                message
            }
            RequestFailure::Interrupted { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Ready,
    /// Sent, nothing received yet
    Submitted,
    Streaming,
    Error(RequestFailure),
}

impl RequestStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestStatus::Submitted | RequestStatus::Streaming)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A request is already in progress")]
    RequestInFlight,
    #[error("Message is empty")]
    EmptyMessage,
}

/// Per-conversation state rebuilt from events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    messages: IndexMap<String, Message>,
    status: RequestStatus,
    /// Assistant message receiving events for the current request
    active_message: Option<String>,
    failed_messages: HashSet<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State seeded with an existing conversation
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().map(|m| (m.id.clone(), m)).collect(),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn status(&self) -> &RequestStatus {
        &self.status
    }

    /// True when the message was cut short by a failed request
    pub fn is_failed(&self, message_id: &str) -> bool {
        self.failed_messages.contains(message_id)
    }

    /// Whether the input box may send. Exactly one request is in flight at a time.
    pub fn can_submit(&self) -> bool {
        !self.status.is_in_flight()
    }

    /// Append the user's message and mark the request as submitted.
    ///
    /// Returns the conversation to send to the server.
    pub fn begin_submission(&mut self, text: &str) -> Result<Vec<Message>, SubmitError> {
        if !self.can_submit() {
            return Err(SubmitError::RequestInFlight);
        }
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }

        let message = Message::user(format!("user_{}", uuid::Uuid::new_v4().simple()), text);
        self.messages.insert(message.id.clone(), message);
        self.status = RequestStatus::Submitted;
        self.active_message = None;
        Ok(self.messages.values().cloned().collect())
    }

    /// The server refused the request before any event was streamed
    pub fn reject(&mut self, status: u16, message: impl Into<String>) {
        self.status = RequestStatus::Error(RequestFailure::Rejected {
            status,
            message: message.into(),
        });
        self.active_message = None;
    }

    /// The connection ended without `done` or `error`. Partial content stays.
    pub fn interrupt(&mut self, reason: impl Into<String>) {
        if !self.status.is_in_flight() {
            return;
        }
        let reason = reason.into();
        self.fail_active_message(&reason);
        self.status = RequestStatus::Error(RequestFailure::Interrupted { reason });
    }

    /// Replace the whole conversation (switching conversations, loading history)
    pub fn replace_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        *self = Self::with_messages(messages);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold one event into the state
    pub fn apply(&mut self, event: &StreamEvent) {
        // Only a submitted request moves to Streaming
        if !event.is_terminal() && self.status == RequestStatus::Submitted {
            self.status = RequestStatus::Streaming;
        }

        match event {
            StreamEvent::TextDelta { message_id, delta } => {
                self.assistant_message(message_id).append_text(delta);
            }
            StreamEvent::ToolCallStart {
                message_id,
                tool_call_id,
                tool_name,
                input,
            } => self.handle_tool_call_start(message_id, tool_call_id, *tool_name, input),
            StreamEvent::ToolCallResult {
                message_id,
                tool_call_id,
                output,
            } => self.handle_tool_call_result(message_id, tool_call_id, output),
            StreamEvent::StepBoundary { message_id, .. } => {
                self.assistant_message(message_id);
            }
            StreamEvent::Error {
                message_id,
                message,
            } => {
                self.active_message = Some(message_id.clone());
                self.fail_active_message(message);
                self.status = RequestStatus::Error(RequestFailure::Server {
                    message: message.clone(),
                });
            }
            StreamEvent::Done { .. } => {
                self.status = RequestStatus::Ready;
                self.active_message = None;
            }
        }
    }

    fn assistant_message(&mut self, message_id: &str) -> &mut Message {
        self.active_message = Some(message_id.to_string());
        self.messages
            .entry(message_id.to_string())
            .or_insert_with(|| Message::assistant(message_id))
    }

    fn handle_tool_call_start(
        &mut self,
        message_id: &str,
        tool_call_id: &str,
        tool_name: ToolName,
        input: &Value,
    ) {
        let message = self.assistant_message(message_id);
        if message.tool_part_mut(tool_call_id).is_some() {
            tracing::warn!(tool_call_id, "Duplicate tool-call-start ignored");
            return;
        }

        let mut part = ToolPart::new(tool_call_id, tool_name);
        if let Err(e) = part.set_input(input.clone()) {
            tracing::warn!(tool_call_id, "Could not record tool input: {}", e);
        }
        message.parts.push(Part::Tool(part));
    }

    fn handle_tool_call_result(
        &mut self,
        message_id: &str,
        tool_call_id: &str,
        output: &[ToolResultItem],
    ) {
        let Some(part) = self
            .messages
            .get_mut(message_id)
            .and_then(|m| m.tool_part_mut(tool_call_id))
        else {
            tracing::warn!(message_id, tool_call_id, "Result for an unknown tool call dropped");
            return;
        };

        if let Err(e) = part.set_output(output.to_vec()) {
            tracing::warn!(tool_call_id, "Tool result out of order: {}", e);
        }
    }

    /// Mark the message being streamed as failed and stop its running tools
    fn fail_active_message(&mut self, reason: &str) {
        let Some(message_id) = self.active_message.take() else {
            return;
        };
        if let Some(message) = self.messages.get_mut(&message_id) {
            for part in message.parts.iter_mut() {
                if let Part::Tool(tool) = part {
                    if tool.is_running() {
                        let _ = tool.fail(reason);
                    }
                }
            }
        }
        self.failed_messages.insert(message_id);
    }

    /// Assistant messages in conversation order
    pub fn assistant_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages().filter(|m| m.role == Role::Assistant)
    }
}

/// Pure fold of one request's event sequence into an empty conversation
pub fn fold<'a, I>(events: I) -> ConversationState
where
    I: IntoIterator<Item = &'a StreamEvent>,
{
    let mut state = ConversationState {
        status: RequestStatus::Submitted,
        ..ConversationState::new()
    };
    for event in events {
        state.apply(event);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{FinishReason, ToolState};
    use proptest::prelude::*;
    use serde_json::json;

    const MSG: &str = "msg_1";

    fn text(delta: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            message_id: MSG.to_string(),
            delta: delta.to_string(),
        }
    }

    fn start(id: &str, query: &str) -> StreamEvent {
        StreamEvent::ToolCallStart {
            message_id: MSG.to_string(),
            tool_call_id: id.to_string(),
            tool_name: ToolName::SearchWeb,
            input: json!({ "query": query }),
        }
    }

    fn result(id: &str, n: usize) -> StreamEvent {
        StreamEvent::ToolCallResult {
            message_id: MSG.to_string(),
            tool_call_id: id.to_string(),
            output: (1..=n)
                .map(|i| {
                    ToolResultItem::new(
                        format!("Result {i}"),
                        format!("https://example.com/{i}"),
                        "snippet",
                    )
                })
                .collect(),
        }
    }

    fn done() -> StreamEvent {
        StreamEvent::Done {
            message_id: MSG.to_string(),
            finish_reason: FinishReason::Stop,
        }
    }

    fn tool(state: &ConversationState, index: usize) -> ToolPart {
        state.message(MSG).unwrap().tool_parts().nth(index).unwrap().clone()
    }

    #[test]
    fn test_text_deltas_accumulate() {
        let state = fold(&[text("Paris "), text("is the capital"), done()]);

        let message = state.message(MSG).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.text(), "Paris is the capital");
        assert_eq!(*state.status(), RequestStatus::Ready);
    }

    #[test]
    fn test_tool_part_lifecycle() {
        let mut state = ConversationState::new();
        state.apply(&start("call_1", "weather"));
        assert_eq!(tool(&state, 0).state, ToolState::InputAvailable);
        assert!(state.message(MSG).unwrap().has_running_tool());

        state.apply(&result("call_1", 3));
        let part = tool(&state, 0);
        assert_eq!(part.state, ToolState::OutputAvailable);
        assert_eq!(part.output.unwrap().len(), 3);
        assert!(!state.message(MSG).unwrap().has_running_tool());
    }

    #[test]
    fn test_text_after_tool_starts_new_part() {
        let state = fold(&[text("Let me check. "), start("c", "q"), result("c", 1), text("Done.")]);
        let parts = &state.message(MSG).unwrap().parts;
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[2], Part::Text { ref text } if text == "Done."));
    }

    #[test]
    fn test_result_for_unknown_call_is_dropped() {
        let state = fold(&[text("hi"), result("ghost", 2)]);
        assert_eq!(state.message(MSG).unwrap().tool_parts().count(), 0);
    }

    #[test]
    fn test_error_event_keeps_content_and_stops_running_tools() {
        let state = fold(&[
            text("Partial answer"),
            start("c", "q"),
            StreamEvent::Error {
                message_id: MSG.to_string(),
                message: "The assistant is temporarily unavailable.".to_string(),
            },
        ]);

        assert_eq!(
            *state.status(),
            RequestStatus::Error(RequestFailure::Server {
                message: "The assistant is temporarily unavailable.".to_string()
            })
        );
        assert_eq!(state.message(MSG).unwrap().text(), "Partial answer");
        assert_eq!(tool(&state, 0).state, ToolState::OutputError);
        assert!(state.is_failed(MSG));
    }

    #[test]
    fn test_interrupt_after_two_deltas_keeps_text() {
        let mut state = ConversationState::new();
        state.begin_submission("tell me a story").unwrap();
        state.apply(&text("Once upon "));
        state.apply(&text("a time"));
        state.interrupt("connection closed");

        assert_eq!(state.message(MSG).unwrap().text(), "Once upon a time");
        assert!(state.is_failed(MSG));
        assert_eq!(
            *state.status(),
            RequestStatus::Error(RequestFailure::Interrupted {
                reason: "connection closed".to_string()
            })
        );
        assert!(state.can_submit());
    }

    #[test]
    fn test_interrupt_when_idle_is_ignored() {
        let mut state = fold(&[text("hi"), done()]);
        state.interrupt("late drop");
        assert_eq!(*state.status(), RequestStatus::Ready);
        assert!(!state.is_failed(MSG));
    }

    #[test]
    fn test_only_one_request_in_flight() {
        let mut state = ConversationState::new();
        let sent = state.begin_submission("first").unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(*state.status(), RequestStatus::Submitted);
        assert!(!state.can_submit());
        assert_eq!(
            state.begin_submission("second"),
            Err(SubmitError::RequestInFlight)
        );

        state.apply(&text("answer"));
        assert_eq!(*state.status(), RequestStatus::Streaming);
        assert!(state.begin_submission("third").is_err());

        state.apply(&done());
        let sent = state.begin_submission("fourth").unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].role, Role::Assistant);
    }

    #[test]
    fn test_blank_submission_rejected() {
        let mut state = ConversationState::new();
        assert_eq!(state.begin_submission("   "), Err(SubmitError::EmptyMessage));
        assert!(state.is_empty());
    }

    #[test]
    fn test_stray_event_after_error_keeps_submission_open() {
        let mut state = fold(&[
            text("partial"),
            StreamEvent::Error {
                message_id: MSG.to_string(),
                message: "Request timed out".to_string(),
            },
        ]);
        state.apply(&text(" late"));
        state.apply(&start("c1", "late query"));

        assert!(matches!(
            state.status(),
            RequestStatus::Error(RequestFailure::Server { .. })
        ));
        assert!(state.can_submit());
    }

    #[test]
    fn test_event_while_ready_does_not_lock_submission() {
        let mut state = fold(&[text("hi"), done()]);
        state.apply(&text(" again"));
        assert_eq!(*state.status(), RequestStatus::Ready);
        assert!(state.can_submit());
    }

    #[test]
    fn test_replace_messages_clears_status() {
        let mut state = fold(&[text("x"), StreamEvent::Error {
            message_id: MSG.to_string(),
            message: "boom".to_string(),
        }]);
        state.replace_messages(vec![Message::user("u1", "new conversation")]);
        assert_eq!(state.len(), 1);
        assert_eq!(*state.status(), RequestStatus::Ready);
        assert!(!state.is_failed(MSG));
    }

    proptest! {
        /// Any prefix of a valid stream folds to a state whose text is the
        /// concatenation of the deltas seen so far.
        #[test]
        fn prop_prefix_text_is_retained(deltas in proptest::collection::vec("[a-z ]{1,8}", 1..12), cut in 0usize..12) {
            let events: Vec<StreamEvent> = deltas.iter().map(|d| text(d)).collect();
            let cut = cut.min(events.len());
            let mut state = ConversationState::new();
            state.begin_submission("q").unwrap();
            for event in &events[..cut] {
                state.apply(event);
            }
            state.interrupt("dropped");

            let expected: String = deltas[..cut].concat();
            let actual = state.message(MSG).map(|m| m.text()).unwrap_or_default();
            prop_assert_eq!(actual, expected);
            prop_assert!(state.can_submit());
        }
    }
}
