//! SearxNG JSON search

use crate::collaborators::SearchProvider;
use crate::error::ProviderError;
use async_trait::async_trait;
use brief_core::{SearchConfig, SearchResult};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Client for a SearxNG instance
#[derive(Debug, Clone)]
pub struct SearxngSearch {
    client: reqwest::Client,
    endpoint: Url,
}

impl SearxngSearch {
    /// Build from config
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(&format!("{}/search", config.base_url.trim_end_matches('/')))
            .map_err(|e| ProviderError::Config(format!("invalid search base url {:?}: {e}", config.base_url)))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

fn parse_results(body: &str, k: usize) -> Result<Vec<SearchResult>, ProviderError> {
    let response: SearxResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .take(k)
        .enumerate()
        .map(|(i, r)| {
            let title = if r.title.trim().is_empty() { r.url.clone() } else { r.title };
            SearchResult::new(r.url, title, u32::try_from(i + 1).unwrap_or(u32::MAX))
                .with_snippet(r.content)
        })
        .collect())
}

#[async_trait]
impl SearchProvider for SearxngSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, ProviderError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_results(&body, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn results_are_ranked_and_capped() {
        let body = r#"{"query":"q","results":[
            {"url":"https://a.example/1","title":"One","content":"first"},
            {"url":"","title":"blank"},
            {"url":"https://b.example/2","title":"","content":"second"},
            {"url":"https://c.example/3","title":"Three"}
        ]}"#;
        let results = parse_results(body, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].snippet, "first");
        assert_eq!(results[1].title, "https://b.example/2");
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn non_json_is_invalid() {
        assert!(matches!(parse_results("<html/>", 5), Err(ProviderError::InvalidResponse(_))));
    }
}
