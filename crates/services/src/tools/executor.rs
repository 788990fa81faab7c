//! Tool executor framework
//!
//! Each tool implements [`ToolExecutor`]; the [`ToolRegistry`] dispatches calls by
//! name and turns every failure into a synthetic error item, so a broken tool never
//! interrupts generation.

use async_trait::async_trait;
use domain::{ToolName, ToolResultItem};
use inference_providers::ToolDefinition;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

use super::ports::WebSearchError;
use super::web_search::format_search_results;

/// Maximum consecutive failures before logging error instead of warning
pub const MAX_CONSECUTIVE_TOOL_FAILURES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Search(#[from] WebSearchError),
    #[error("Tool call was cancelled")]
    Cancelled,
}

/// Normalized outcome of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub items: Vec<ToolResultItem>,
    /// The items describe a failure rather than real results
    pub failed: bool,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> ToolName;

    /// Function definition advertised to the model
    fn definition(&self) -> ToolDefinition;

    async fn execute(
        &self,
        arguments: &serde_json::Value,
    ) -> Result<Vec<ToolResultItem>, ToolError>;

    /// Convert an execution failure into output the model and the user can see.
    fn handle_error(&self, error: &ToolError) -> Vec<ToolResultItem> {
        vec![ToolResultItem::search_error(error.to_string())]
    }

    /// Render items as the text block fed back to the model
    fn format_output(&self, items: &[ToolResultItem]) -> String {
        serde_json::to_string(items).unwrap_or_default()
    }
}

/// Dispatches tool calls by name.
///
/// One registry serves every request, so the consecutive-failure counts are
/// process-wide: they track the health of the tool's backend, not of any one
/// conversation, and only decide whether a failure is logged at `warn` or `error`.
pub struct ToolRegistry {
    executors: Vec<Arc<dyn ToolExecutor>>,
    /// Consecutive failures per tool across all requests
    failure_counts: RwLock<HashMap<ToolName, u32>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
            failure_counts: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.executors.push(executor);
    }

    fn find(&self, tool_name: &str) -> Option<&Arc<dyn ToolExecutor>> {
        let name: ToolName = tool_name.parse().ok()?;
        self.executors.iter().find(|e| e.name() == name)
    }

    pub fn can_handle(&self, tool_name: &str) -> bool {
        self.find(tool_name).is_some()
    }

    /// Definitions of every registered tool, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.executors.iter().map(|e| e.definition()).collect()
    }

    /// Failures of `tool` since its last success, across all requests
    pub fn consecutive_failures(&self, tool: ToolName) -> u32 {
        self.failure_counts
            .read()
            .ok()
            .and_then(|counts| counts.get(&tool).copied())
            .unwrap_or(0)
    }

    fn reset_failure_count(&self, tool: ToolName) {
        if let Ok(mut counts) = self.failure_counts.write() {
            counts.remove(&tool);
        }
    }

    fn increment_failure_count(&self, tool: ToolName) -> u32 {
        if let Ok(mut counts) = self.failure_counts.write() {
            let count = counts.entry(tool).or_insert(0);
            *count += 1;
            *count
        } else {
            1
        }
    }

    fn log_tool_error(&self, tool: ToolName, failure_count: u32, error: &ToolError) {
        if failure_count > MAX_CONSECUTIVE_TOOL_FAILURES {
            tracing::error!(
                tool = %tool,
                failures = failure_count,
                error = %error,
                "Tool keeps failing after {} attempts, returning error item",
                MAX_CONSECUTIVE_TOOL_FAILURES,
            );
        } else {
            tracing::warn!(
                tool = %tool,
                attempt = failure_count,
                max_retries = MAX_CONSECUTIVE_TOOL_FAILURES,
                error = %error,
                "Tool failed, returning error item",
            );
        }
    }

    /// Run a tool call to completion or cancellation. Never fails.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> ToolInvocation {
        let Some(executor) = self.find(tool_name) else {
            tracing::warn!(tool = %tool_name, "Model requested an unknown tool");
            return ToolInvocation {
                tool_name: tool_name.to_string(),
                items: vec![ToolResultItem::search_error(
                    ToolError::UnknownTool(tool_name.to_string()).to_string(),
                )],
                failed: true,
            };
        };
        let tool = executor.name();

        // Dropping the execute future aborts any in-flight request
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            result = executor.execute(arguments) => result,
        };

        match result {
            Ok(items) => {
                self.reset_failure_count(tool);
                ToolInvocation {
                    tool_name: tool.to_string(),
                    items,
                    failed: false,
                }
            }
            Err(ToolError::Cancelled) => {
                tracing::debug!(tool = %tool, "Tool call cancelled");
                ToolInvocation {
                    tool_name: tool.to_string(),
                    items: executor.handle_error(&ToolError::Cancelled),
                    failed: true,
                }
            }
            Err(error) => {
                let failure_count = self.increment_failure_count(tool);
                self.log_tool_error(tool, failure_count, &error);
                ToolInvocation {
                    tool_name: tool.to_string(),
                    items: executor.handle_error(&error),
                    failed: true,
                }
            }
        }
    }

    /// Text block for the model. Unknown tools use the search layout.
    pub fn format_output(&self, tool_name: &str, items: &[ToolResultItem]) -> String {
        match self.find(tool_name) {
            Some(executor) => executor.format_output(items),
            None => format_search_results(items),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
