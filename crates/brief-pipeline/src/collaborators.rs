//! External capabilities the pipeline drives
//!
//! Completion, search and critique are reached only through these traits.
//! Every answer from a completion backend is treated as untrusted text and
//! routed through `brief_extract`.

use crate::error::ProviderError;
use async_trait::async_trait;
use brief_core::SearchResult;
use brief_extract::ExpectedShape;
use serde::{Deserialize, Serialize};

/// Which pipeline step a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Research plan
    Plan,
    /// Claim synthesis over a batch of sources
    Claims,
    /// Report narrative
    Draft,
    /// Report critique
    Critique,
}

impl PromptKind {
    /// Shape the response is expected to take
    #[must_use]
    pub fn expected_shape(self) -> ExpectedShape {
        match self {
            PromptKind::Plan => ExpectedShape::Plan,
            PromptKind::Claims => ExpectedShape::Claims,
            PromptKind::Draft => ExpectedShape::Draft,
            PromptKind::Critique => ExpectedShape::Critique,
        }
    }

    /// Stable lowercase name for logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Plan => "plan",
            PromptKind::Claims => "claims",
            PromptKind::Draft => "draft",
            PromptKind::Critique => "critique",
        }
    }
}

/// One request to the completion capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Pipeline step issuing the request
    pub kind: PromptKind,
    /// System instruction
    pub system: String,
    /// User prompt
    pub prompt: String,
    /// Shape hint for the response
    pub shape: ExpectedShape,
    /// Sampling temperature, if overriding the client default
    pub temperature: Option<f32>,
    /// Token limit, if overriding the client default
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Request for `kind` with its expected shape
    #[must_use]
    pub fn new(kind: PromptKind, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: system.into(),
            prompt: prompt.into(),
            shape: kind.expected_shape(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// With sampling temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// With token limit
    #[inline]
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Text completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Raw response text; may be malformed
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `k` results for `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, ProviderError>;
}

/// Report evaluator
#[async_trait]
pub trait Critic: Send + Sync {
    /// Raw critique text for a report; parsed by the revision controller
    async fn critique(&self, topic: &str, report_text: &str) -> Result<String, ProviderError>;
}
