//! `searchWeb` tool executor

use async_trait::async_trait;
use domain::{SearchWebInput, ToolName, ToolResultItem, SEARCH_RESULT_COUNT};
use inference_providers::{FunctionDefinition, ToolDefinition};
use std::sync::Arc;

use super::executor::{ToolError, ToolExecutor};
use super::ports::{WebSearchParams, WebSearchProviderTrait};

const SEARCH_WEB_DESCRIPTION: &str =
    "Search the web for up-to-date information. Use it for recent events or facts you are unsure about.";

/// Format search results as numbered sources for the model
pub fn format_search_results(items: &[ToolResultItem]) -> String {
    if items.is_empty() {
        return "No results found.".to_string();
    }

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            if item.is_error() {
                format!("Search error: {}\n", item.snippet)
            } else {
                format!(
                    "Source: {}\nTitle: {}\nURL: {}\nSnippet: {}\n",
                    idx + 1,
                    item.title,
                    item.link,
                    item.snippet
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct WebSearchToolExecutor {
    provider: Arc<dyn WebSearchProviderTrait>,
    result_count: u32,
}

impl WebSearchToolExecutor {
    pub fn new(provider: Arc<dyn WebSearchProviderTrait>) -> Self {
        Self {
            provider,
            result_count: SEARCH_RESULT_COUNT,
        }
    }

    fn parse_input(arguments: &serde_json::Value) -> Result<SearchWebInput, ToolError> {
        let input: SearchWebInput = serde_json::from_value(arguments.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if input.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "query must not be empty".to_string(),
            ));
        }
        Ok(input)
    }
}

#[async_trait]
impl ToolExecutor for WebSearchToolExecutor {
    fn name(&self) -> ToolName {
        ToolName::SearchWeb
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            type_: "function".to_string(),
            function: FunctionDefinition {
                name: ToolName::SearchWeb.as_str().to_string(),
                description: Some(SEARCH_WEB_DESCRIPTION.to_string()),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query"
                        }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
            },
        }
    }

    async fn execute(
        &self,
        arguments: &serde_json::Value,
    ) -> Result<Vec<ToolResultItem>, ToolError> {
        let input = Self::parse_input(arguments)?;
        let params = WebSearchParams::new(input.query).with_count(self.result_count);

        // `count` is only a hint to the provider
        let results = self.provider.search(params).await?;
        Ok(results
            .into_iter()
            .take(self.result_count as usize)
            .map(|r| ToolResultItem::new(r.title, r.url, r.snippet))
            .collect())
    }

    fn format_output(&self, items: &[ToolResultItem]) -> String {
        format_search_results(items)
    }
}
