use domain::{FinishReason, Message, Part, Role, StreamEvent, ToolName, ToolResultItem};
use futures::channel::mpsc::UnboundedSender;
use inference_providers::{ChatMessage, ToolCall, ToolCallDelta};
use std::collections::BTreeMap;

use super::errors::ChatError;
use crate::tools::ToolRegistry;

/// Writes events for one assistant message into the outgoing channel
pub struct EventEmitter {
    tx: UnboundedSender<StreamEvent>,
    message_id: String,
    emitted: usize,
}

impl EventEmitter {
    pub fn new(tx: UnboundedSender<StreamEvent>, message_id: impl Into<String>) -> Self {
        Self {
            tx,
            message_id: message_id.into(),
            emitted: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Events successfully handed to the channel so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn send(&mut self, event: StreamEvent) -> Result<(), ChatError> {
        self.tx
            .unbounded_send(event)
            .map_err(|_| ChatError::StreamClosed)?;
        self.emitted += 1;
        Ok(())
    }

    pub fn text_delta(&mut self, delta: impl Into<String>) -> Result<(), ChatError> {
        self.send(StreamEvent::TextDelta {
            message_id: self.message_id.clone(),
            delta: delta.into(),
        })
    }

    pub fn tool_call_start(
        &mut self,
        tool_call_id: &str,
        tool_name: ToolName,
        input: serde_json::Value,
    ) -> Result<(), ChatError> {
        self.send(StreamEvent::ToolCallStart {
            message_id: self.message_id.clone(),
            tool_call_id: tool_call_id.to_string(),
            tool_name,
            input,
        })
    }

    pub fn tool_call_result(
        &mut self,
        tool_call_id: &str,
        output: Vec<ToolResultItem>,
    ) -> Result<(), ChatError> {
        self.send(StreamEvent::ToolCallResult {
            message_id: self.message_id.clone(),
            tool_call_id: tool_call_id.to_string(),
            output,
        })
    }

    pub fn step_boundary(&mut self, step: u32) -> Result<(), ChatError> {
        self.send(StreamEvent::StepBoundary {
            message_id: self.message_id.clone(),
            step,
        })
    }

    pub fn error(&mut self, message: impl Into<String>) -> Result<(), ChatError> {
        self.send(StreamEvent::Error {
            message_id: self.message_id.clone(),
            message: message.into(),
        })
    }

    pub fn done(&mut self, finish_reason: FinishReason) -> Result<(), ChatError> {
        self.send(StreamEvent::Done {
            message_id: self.message_id.clone(),
            finish_reason,
        })
    }
}

/// Tool call assembled from streamed fragments
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text as produced by the model
    pub arguments: String,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects tool-call fragments by index until the step's stream ends
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<i64, PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let index = delta.index.unwrap_or(0);
        let pending = self.calls.entry(index).or_default();
        if let Some(id) = delta.id.as_ref().filter(|id| !id.is_empty()) {
            pending.id = Some(id.clone());
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                pending.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                pending.arguments.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Calls in index order. Calls without an id get a generated one.
    pub fn finish(self) -> Vec<AccumulatedToolCall> {
        self.calls
            .into_values()
            .filter(|pending| !pending.name.is_empty())
            .map(|pending| AccumulatedToolCall {
                id: pending
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: pending.name,
                arguments: pending.arguments,
            })
            .collect()
    }
}

/// Build the model context: fixed system instruction, then the conversation.
///
/// Completed tool parts are replayed as an assistant `tool_calls` message followed
/// by a `tool` message with the formatted results. Tool parts without output are
/// dropped since the model never saw their result.
pub fn build_model_messages(
    system_prompt: &str,
    history: &[Message],
    tools: &ToolRegistry,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    for message in history {
        match message.role {
            Role::User => messages.push(ChatMessage::user(message.text())),
            Role::System => {}
            Role::Assistant => {
                let mut pending_text = String::new();
                for part in &message.parts {
                    match part {
                        Part::Text { text } => pending_text.push_str(text),
                        Part::Tool(tool) => {
                            let Some(output) = &tool.output else {
                                continue;
                            };
                            let arguments = tool
                                .input
                                .as_ref()
                                .map(|input| input.to_string())
                                .unwrap_or_else(|| "{}".to_string());
                            let content = (!pending_text.is_empty())
                                .then(|| std::mem::take(&mut pending_text));
                            messages.push(ChatMessage::assistant_tool_calls(
                                content,
                                vec![ToolCall::function(
                                    tool.tool_call_id.clone(),
                                    tool.tool_name.as_str(),
                                    arguments,
                                )],
                            ));
                            messages.push(ChatMessage::tool(
                                tool.tool_call_id.clone(),
                                tools.format_output(tool.tool_name.as_str(), output),
                            ));
                        }
                    }
                }
                if !pending_text.is_empty() {
                    messages.push(ChatMessage::assistant(pending_text));
                }
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticSearchProvider;
    use crate::tools::default_registry;
    use domain::ToolPart;
    use futures::StreamExt;
    use inference_providers::{FunctionCallDelta, MessageRole};
    use std::sync::Arc;

    fn delta(index: i64, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index: Some(index),
            id: id.map(str::to_string),
            type_: None,
            function: Some(FunctionCallDelta {
                name: name.map(str::to_string),
                arguments: args.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_accumulator_joins_fragments_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(1, Some("call_b"), Some("searchWeb"), None));
        acc.push(&delta(0, Some("call_a"), Some("searchWeb"), Some("{\"query\":")));
        acc.push(&delta(1, None, None, Some("{\"query\":\"b\"}")));
        acc.push(&delta(0, None, None, Some("\"a\"}")));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments, "{\"query\":\"a\"}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].arguments, "{\"query\":\"b\"}");
    }

    #[test]
    fn test_accumulator_generates_missing_ids() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(0, None, Some("searchWeb"), Some("{}")));
        let calls = acc.finish();
        assert!(calls[0].id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_emitter_counts_and_detects_closed_stream() {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut emitter = EventEmitter::new(tx, "msg_1");
        emitter.text_delta("Hi").unwrap();
        emitter.done(FinishReason::Stop).unwrap();
        assert_eq!(emitter.emitted(), 2);

        let events: Vec<StreamEvent> = rx.take(2).collect().await;
        assert_eq!(events[0].event_type(), "text-delta");

        let (tx, rx) = futures::channel::mpsc::unbounded();
        drop(rx);
        let mut emitter = EventEmitter::new(tx, "msg_2");
        assert!(matches!(emitter.text_delta("x"), Err(ChatError::StreamClosed)));
        assert_eq!(emitter.emitted(), 0);
    }

    #[test]
    fn test_history_replays_completed_tool_calls() {
        let registry = default_registry(Arc::new(StaticSearchProvider::new(vec![])));
        let mut assistant = Message::assistant("msg_a");
        assistant.append_text("Let me check. ");
        let mut part = ToolPart::new("call_1", ToolName::SearchWeb);
        part.set_input(serde_json::json!({"query": "weather oslo"})).unwrap();
        part.set_output(vec![ToolResultItem::new("Yr", "https://yr.no", "Rain")])
            .unwrap();
        assistant.parts.push(Part::Tool(part));
        let mut running = ToolPart::new("call_2", ToolName::SearchWeb);
        running.set_input(serde_json::json!({"query": "x"})).unwrap();
        assistant.parts.push(Part::Tool(running));
        assistant.append_text("It is raining.");

        let history = vec![
            Message::user("u1", "Weather in Oslo?"),
            assistant,
            Message::user("u2", "Thanks"),
        ];
        let messages = build_model_messages("be brief", &history, &registry);

        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
                MessageRole::User,
            ]
        );
        assert_eq!(messages[2].content.as_deref(), Some("Let me check. "));
        let call = &messages[2].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "searchWeb");
        assert_eq!(call.function.arguments, r#"{"query":"weather oslo"}"#);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(messages[3].content.as_deref().unwrap().contains("URL: https://yr.no"));
        assert_eq!(messages[4].content.as_deref(), Some("It is raining."));
    }
}
