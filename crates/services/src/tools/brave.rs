use super::ports::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct BraveWebSearchProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl BraveWebSearchProvider {
    pub fn new(config: &config::SearchConfig) -> Result<Self, WebSearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| WebSearchError::WebSearchRequestFailed(e.to_string()))?;
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            client,
        })
    }

    fn brave_get_builder(&self) -> reqwest::RequestBuilder {
        self.client
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
    }
}

/// Root response from Brave Search API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BraveSearchResponse {
    #[serde(default)]
    pub web: Option<BraveWebResults>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BraveWebResults {
    #[serde(default)]
    pub results: Vec<BraveWebSearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BraveWebSearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<BraveWebSearchResult> for WebSearchResult {
    fn from(result: BraveWebSearchResult) -> Self {
        WebSearchResult {
            title: result.title,
            url: result.url,
            snippet: result.description.unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl WebSearchProviderTrait for BraveWebSearchProvider {
    async fn search(
        &self,
        params: WebSearchParams,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        tracing::debug!(query = %params.query, count = ?params.count, "Searching the web");

        let mut request = self.brave_get_builder().query(&[("q", params.query.as_str())]);
        if let Some(count) = params.count {
            request = request.query(&[("count", count)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WebSearchError::WebSearchRequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!(%status, "Brave API error: {}", error_body);
            return Err(WebSearchError::WebSearchRequestFailed(format!(
                "HTTP {status}: {error_body}"
            )));
        }

        let brave_response: BraveSearchResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Brave response: {}", e);
            WebSearchError::WebSearchResponseParsingFailed(format!("JSON parsing error: {e}"))
        })?;

        let results: Vec<WebSearchResult> = brave_response
            .web
            .map(|web| web.results.into_iter().map(Into::into).collect())
            .unwrap_or_default();
        tracing::debug!("Found {} results", results.len());
        Ok(results)
    }
}
