//! Model/tool step loop for one chat request
//!
//! The orchestrator alternates between streaming a model step and running the tool
//! calls that step requested, forwarding everything as [`StreamEvent`]s through the
//! request's [`EventEmitter`]. It owns the per-request state machine:
//!
//! ```text
//! Idle -> Generating -> (ToolExecuting -> Generating)* -> Finished | Failed
//! ```
//!
//! Provider failures that happen before a step emitted anything are retried with
//! exponential backoff. Everything else ends the stream with a single `error` event.
//!
//! [`StreamEvent`]: domain::StreamEvent

use domain::{FinishReason, Message, Part, ToolName, ToolPart};
use futures::StreamExt;
use inference_providers::{
    ChatCompletionParams, ChatMessage, CompletionError, InferenceProvider, ToolCall, ToolChoice,
    ToolDefinition,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use super::errors::ChatError;
use super::models::{OrchestratorConfig, OrchestratorState};
use super::service_helpers::{
    build_model_messages, AccumulatedToolCall, EventEmitter, ToolCallAccumulator,
};
use crate::tools::ToolRegistry;

/// Output of one model step
struct StepOutput {
    text: String,
    tool_calls: Vec<AccumulatedToolCall>,
}

/// Mutable state of one run
struct RunContext {
    state: OrchestratorState,
    emitter: EventEmitter,
    model_messages: Vec<ChatMessage>,
    /// The assistant message as the client will reconstruct it
    message: Message,
}

impl RunContext {
    fn transition(&mut self, next: OrchestratorState) -> Result<(), ChatError> {
        self.state.transition(next).map_err(|e| {
            tracing::error!(error = %e, "Orchestrator state machine violated");
            ChatError::from(e)
        })
    }
}

/// Parse model-produced argument text; invalid JSON is kept verbatim as a string
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

pub struct StreamOrchestrator {
    provider: Arc<dyn InferenceProvider>,
    tools: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl StreamOrchestrator {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        tools: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Drive one request until it finishes, fails or is cancelled.
    ///
    /// Returns the assistant message as built from the emitted events.
    pub async fn run(
        &self,
        history: Vec<Message>,
        emitter: EventEmitter,
        cancel: CancellationToken,
    ) -> Message {
        let mut run = RunContext {
            state: OrchestratorState::Idle,
            model_messages: build_model_messages(&self.config.system_prompt, &history, &self.tools),
            message: Message::assistant(emitter.message_id()),
            emitter,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout, self.drive(&mut run, &cancel)) => {
                result.unwrap_or(Err(ChatError::RequestTimeout))
            }
        };

        match result {
            Ok(finish_reason) => {
                if run.transition(OrchestratorState::Finished).is_ok() {
                    if let Err(e) = run.emitter.done(finish_reason) {
                        tracing::debug!(error = %e, "Client left before the done event");
                    }
                }
                tracing::info!(?finish_reason, "Chat stream finished");
            }
            Err(e) if e.is_silent() => {
                let _ = run.transition(OrchestratorState::Failed);
                tracing::info!(reason = %e, "Chat stream abandoned");
            }
            Err(e) => {
                tracing::error!(error = %e, state = %run.state, "Chat stream failed");
                if run.transition(OrchestratorState::Failed).is_ok() {
                    let _ = run.emitter.error(e.user_message());
                }
            }
        }

        run.message
    }

    async fn drive(
        &self,
        run: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<FinishReason, ChatError> {
        let definitions = self.tools.definitions();

        for step in 1..=self.config.max_steps {
            run.transition(OrchestratorState::Generating)?;
            let output = self
                .generate_with_retries(run, step, &definitions, cancel)
                .await?;

            let tool_call_count = output.tool_calls.len();
            if tool_call_count > 0 {
                run.transition(OrchestratorState::ToolExecuting)?;
                self.execute_tool_calls(run, output, cancel).await?;
            }

            run.emitter.step_boundary(step)?;
            tracing::debug!(step, tool_calls = tool_call_count, "Step complete");

            if tool_call_count == 0 {
                return Ok(FinishReason::Stop);
            }
        }

        tracing::info!(max_steps = self.config.max_steps, "Step budget exhausted");
        Ok(FinishReason::MaxSteps)
    }

    async fn generate_with_retries(
        &self,
        run: &mut RunContext,
        step: u32,
        definitions: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<StepOutput, ChatError> {
        let mut attempt: u32 = 0;
        loop {
            let emitted_before = run.emitter.emitted();
            let error = match self.generate(run, definitions, cancel).await {
                Ok(output) => return Ok(output),
                Err(ChatError::Model(error)) => error,
                Err(other) => return Err(other),
            };

            let streamed = run.emitter.emitted() > emitted_before;
            if streamed || !error.is_retryable() {
                tracing::error!(step, attempt, streamed, error = %error, "Model call failed");
                return Err(ChatError::Model(error));
            }
            if attempt >= self.config.max_retries {
                if attempt == 0 {
                    return Err(ChatError::Model(error));
                }
                return Err(ChatError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: error,
                });
            }

            attempt += 1;
            let backoff = self.config.backoff_for(attempt);
            tracing::warn!(
                step,
                attempt,
                max_retries = self.config.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying model call"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Stream one model step, forwarding text as it arrives
    async fn generate(
        &self,
        run: &mut RunContext,
        definitions: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<StepOutput, ChatError> {
        let mut params =
            ChatCompletionParams::new(self.config.model.clone(), run.model_messages.clone());
        params.stream = Some(true);
        if !definitions.is_empty() {
            params.tools = Some(definitions.to_vec());
            params.tool_choice = Some(ToolChoice::String("auto".to_string()));
        }

        let deadline = Instant::now() + self.config.step_timeout;

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = timeout_at(deadline, self.provider.chat_completion_stream(params)) => match result {
                Err(_) => return Err(ChatError::Model(CompletionError::Timeout)),
                Ok(result) => result.map_err(ChatError::Model)?,
            },
        };

        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut finished = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                next = timeout_at(deadline, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => return Err(ChatError::Model(CompletionError::Timeout)),
                Ok(None) => break,
                Ok(Some(chunk)) => chunk.map_err(ChatError::Model)?,
            };

            for choice in chunk.choices {
                if let Some(delta) = choice.delta {
                    if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                        run.message.append_text(&content);
                        text.push_str(&content);
                        run.emitter.text_delta(content)?;
                    }
                    for tool_call in delta.tool_calls.iter().flatten() {
                        accumulator.push(tool_call);
                    }
                }
                if choice.finish_reason.is_some() {
                    finished = true;
                }
            }
        }

        if !finished {
            return Err(ChatError::Model(CompletionError::CompletionError(
                "Model stream ended before completion".to_string(),
            )));
        }

        Ok(StepOutput {
            text,
            tool_calls: accumulator.finish(),
        })
    }

    async fn execute_tool_calls(
        &self,
        run: &mut RunContext,
        output: StepOutput,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let StepOutput {
            text,
            mut tool_calls,
        } = output;

        // Some backends restart call ids every step
        let mut seen: HashSet<String> = run
            .message
            .tool_parts()
            .map(|part| part.tool_call_id.clone())
            .collect();
        for call in &mut tool_calls {
            if !seen.insert(call.id.clone()) {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                seen.insert(call.id.clone());
            }
        }

        let inputs: Vec<serde_json::Value> = tool_calls
            .iter()
            .map(|call| parse_arguments(&call.arguments))
            .collect();
        run.model_messages.push(ChatMessage::assistant_tool_calls(
            (!text.is_empty()).then_some(text),
            tool_calls
                .iter()
                .zip(&inputs)
                .map(|(call, input)| ToolCall::function(&call.id, &call.name, input.to_string()))
                .collect(),
        ));

        for (call, input) in tool_calls.into_iter().zip(inputs) {
            if cancel.is_cancelled() {
                return Err(ChatError::Cancelled);
            }

            let invocation = match call.name.parse::<ToolName>() {
                Ok(tool_name) => {
                    let mut part = ToolPart::new(&call.id, tool_name);
                    part.set_input(input.clone())?;
                    run.message.parts.push(Part::Tool(part));
                    run.emitter
                        .tool_call_start(&call.id, tool_name, input.clone())?;

                    tracing::debug!(tool_call_id = %call.id, tool = %tool_name, "Running tool");
                    let invocation = self.tools.invoke(&call.name, &input, cancel).await;
                    if cancel.is_cancelled() {
                        return Err(ChatError::Cancelled);
                    }

                    if let Some(part) = run.message.tool_part_mut(&call.id) {
                        part.set_output(invocation.items.clone())?;
                    }
                    run.emitter
                        .tool_call_result(&call.id, invocation.items.clone())?;
                    invocation
                }
                Err(e) => {
                    tracing::warn!(tool_call_id = %call.id, error = %e, "Model requested an unknown tool");
                    self.tools.invoke(&call.name, &input, cancel).await
                }
            };

            run.model_messages.push(ChatMessage::tool(
                call.id,
                self.tools
                    .format_output(&invocation.tool_name, &invocation.items),
            ));
        }

        Ok(())
    }
}
