//! Page fetching

use crate::error::FetchError;
use async_trait::async_trait;
use brief_core::FetchConfig;
use std::time::Duration;
use url::Url;

/// Raw page bytes plus the response details the pipeline keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header, if any
    pub content_type: Option<String>,
    /// Body bytes (possibly cut to the size limit)
    pub body: Vec<u8>,
    /// Body was cut to the size limit
    pub truncated: bool,
}

impl FetchedPage {
    /// A 200 response with an HTML body
    #[must_use]
    pub fn html(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            final_url: url,
            status: 200,
            content_type: Some("text/html; charset=utf-8".into()),
            body: body.into(),
            truncated: false,
        }
    }
}

/// Retrieves the bytes behind a URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page; non-success statuses are errors
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a client from fetch settings
    ///
    /// The client timeout is a backstop; the retriever applies the
    /// per-run fetch deadline itself.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Self::client(config)?;
        Ok(Self::with_client(client, config.max_body_bytes))
    }

    /// Shared client configuration (also used for robots.txt)
    pub fn client(config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        if truncated {
            tracing::debug!(%url, limit = self.max_body_bytes, "response body truncated");
        }

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
            truncated,
        })
    }
}
