pub mod brave;
pub mod executor;
pub mod ports;
pub mod web_search;

pub use brave::BraveWebSearchProvider;
pub use executor::{
    ToolError, ToolExecutor, ToolInvocation, ToolRegistry, MAX_CONSECUTIVE_TOOL_FAILURES,
};
pub use ports::{WebSearchError, WebSearchParams, WebSearchProviderTrait, WebSearchResult};
pub use web_search::{format_search_results, WebSearchToolExecutor};

use std::sync::Arc;

/// Registry holding the production tool set: web search only
pub fn default_registry(provider: Arc<dyn WebSearchProviderTrait>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebSearchToolExecutor::new(provider)));
    registry
}
