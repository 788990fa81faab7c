use crate::messages::{ToolName, ToolResultItem};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model produced a step without tool calls
    Stop,
    /// The step budget ran out
    MaxSteps,
}

/// Unit of the outgoing chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    TextDelta {
        message_id: String,
        delta: String,
    },
    ToolCallStart {
        message_id: String,
        tool_call_id: String,
        tool_name: ToolName,
        input: serde_json::Value,
    },
    ToolCallResult {
        message_id: String,
        tool_call_id: String,
        output: Vec<ToolResultItem>,
    },
    StepBoundary {
        message_id: String,
        step: u32,
    },
    Error {
        message_id: String,
        message: String,
    },
    Done {
        message_id: String,
        finish_reason: FinishReason,
    },
}

impl StreamEvent {
    /// Name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::ToolCallStart { .. } => "tool-call-start",
            StreamEvent::ToolCallResult { .. } => "tool-call-result",
            StreamEvent::StepBoundary { .. } => "step-boundary",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done { .. } => "done",
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            StreamEvent::TextDelta { message_id, .. }
            | StreamEvent::ToolCallStart { message_id, .. }
            | StreamEvent::ToolCallResult { message_id, .. }
            | StreamEvent::StepBoundary { message_id, .. }
            | StreamEvent::Error { message_id, .. }
            | StreamEvent::Done { message_id, .. } => message_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::Done { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderingViolation {
    #[error("event {index}: result for tool call {tool_call_id} arrived before its start")]
    ResultBeforeStart { index: usize, tool_call_id: String },
    #[error("event {index}: tool call {tool_call_id} started twice")]
    DuplicateStart { index: usize, tool_call_id: String },
    #[error("event {index}: tool call {tool_call_id} produced a second result")]
    DuplicateResult { index: usize, tool_call_id: String },
    #[error("event {index}: emitted after the stream terminated")]
    EventAfterTerminal { index: usize },
}

/// Incremental checker for the causal order of one event stream
#[derive(Debug, Default)]
pub struct OrderingValidator {
    started: HashSet<(String, String)>,
    finished: HashSet<(String, String)>,
    terminated: bool,
    seen: usize,
}

impl OrderingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &StreamEvent) -> Result<(), OrderingViolation> {
        let index = self.seen;
        self.seen += 1;

        if self.terminated {
            return Err(OrderingViolation::EventAfterTerminal { index });
        }

        match event {
            StreamEvent::ToolCallStart {
                message_id,
                tool_call_id,
                ..
            } => {
                let key = (message_id.clone(), tool_call_id.clone());
                if !self.started.insert(key) {
                    return Err(OrderingViolation::DuplicateStart {
                        index,
                        tool_call_id: tool_call_id.clone(),
                    });
                }
            }
            StreamEvent::ToolCallResult {
                message_id,
                tool_call_id,
                ..
            } => {
                let key = (message_id.clone(), tool_call_id.clone());
                if !self.started.contains(&key) {
                    return Err(OrderingViolation::ResultBeforeStart {
                        index,
                        tool_call_id: tool_call_id.clone(),
                    });
                }
                if !self.finished.insert(key) {
                    return Err(OrderingViolation::DuplicateResult {
                        index,
                        tool_call_id: tool_call_id.clone(),
                    });
                }
            }
            StreamEvent::Error { .. } | StreamEvent::Done { .. } => self.terminated = true,
            StreamEvent::TextDelta { .. } | StreamEvent::StepBoundary { .. } => {}
        }
        Ok(())
    }
}

/// Check a complete sequence, reporting the first violation.
pub fn validate_ordering<'a, I>(events: I) -> Result<(), OrderingViolation>
where
    I: IntoIterator<Item = &'a StreamEvent>,
{
    let mut validator = OrderingValidator::new();
    events
        .into_iter()
        .try_for_each(|event| validator.observe(event))
}
