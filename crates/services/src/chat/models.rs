use std::fmt;
use std::time::Duration;

/// Orchestrator limits, fixed at construction
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub system_prompt: String,
    pub max_steps: u32,
    pub max_retries: u32,
    /// First retry delay; doubles on every further attempt
    pub retry_backoff: Duration,
    pub step_timeout: Duration,
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_config(&config::ChatConfig::default(), model)
    }

    pub fn from_config(chat: &config::ChatConfig, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: chat.system_prompt.clone(),
            max_steps: chat.max_steps.max(1),
            max_retries: chat.max_retries,
            retry_backoff: Duration::from_millis(chat.retry_backoff_ms),
            step_timeout: Duration::from_secs(chat.step_timeout_seconds),
            request_timeout: Duration::from_secs(chat.request_timeout_seconds),
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Lifecycle of one chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Generating,
    ToolExecuting,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid orchestrator transition from {from} to {to}")]
pub struct InvalidStateTransition {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
}

impl OrchestratorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrchestratorState::Finished | OrchestratorState::Failed)
    }

    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        match (self, next) {
            (Finished | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Generating) => true,
            (Generating, Generating | ToolExecuting | Finished) => true,
            (ToolExecuting, Generating | Finished) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, next: OrchestratorState) -> Result<(), InvalidStateTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidStateTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Generating => "generating",
            OrchestratorState::ToolExecuting => "tool-executing",
            OrchestratorState::Finished => "finished",
            OrchestratorState::Failed => "failed",
        };
        f.write_str(name)
    }
}
