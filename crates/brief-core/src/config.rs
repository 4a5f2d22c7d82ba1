//! Configuration
//!
//! `BriefConfig` is read from TOML; every section and field is optional
//! and falls back to the defaults below. Durations are written in seconds.
//!
//! ```toml
//! [constraints]
//! max_rounds = 2
//! per_domain_cap = 2
//! fetch_timeout_secs = 10.0
//!
//! [completion]
//! model = "openai/gpt-4o-mini"
//! ```

use crate::error::BriefError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-run limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Retrieve/synthesize/verify rounds (at least 1)
    pub max_rounds: u32,
    /// Documents kept per domain across the whole run (at least 1)
    pub per_domain_cap: usize,
    /// Deadline for one page fetch
    #[serde(rename = "fetch_timeout_secs", with = "duration_secs")]
    pub fetch_timeout: Duration,
    /// Deadline for one robots.txt verdict
    #[serde(rename = "robots_timeout_secs", with = "duration_secs")]
    pub robots_timeout: Duration,
    /// Extra write passes triggered by critique
    pub max_revisions: u32,
    /// Wall-clock budget for the whole run
    #[serde(rename = "wall_clock_budget_secs", with = "duration_secs")]
    pub wall_clock_budget: Duration,
    /// Fetch tasks in flight at once
    pub max_concurrent_fetches: usize,
    /// Results requested per search query
    pub results_per_query: usize,
    /// Only keep search results from these domains (empty = any)
    pub include_domains: Vec<String>,
    /// Drop search results from these domains
    pub exclude_domains: Vec<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            per_domain_cap: 3,
            fetch_timeout: Duration::from_secs(15),
            robots_timeout: Duration::from_secs(5),
            max_revisions: 1,
            wall_clock_budget: Duration::from_secs(600),
            max_concurrent_fetches: 8,
            results_per_query: 8,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }
}

impl Constraints {
    /// Create default constraints
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max rounds
    #[inline]
    #[must_use]
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// With per-domain cap
    #[inline]
    #[must_use]
    pub fn with_per_domain_cap(mut self, cap: usize) -> Self {
        self.per_domain_cap = cap;
        self
    }

    /// With fetch timeout
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// With robots timeout
    #[inline]
    #[must_use]
    pub fn with_robots_timeout(mut self, timeout: Duration) -> Self {
        self.robots_timeout = timeout;
        self
    }

    /// With max revisions
    #[inline]
    #[must_use]
    pub fn with_max_revisions(mut self, revisions: u32) -> Self {
        self.max_revisions = revisions;
        self
    }

    /// With wall-clock budget
    #[inline]
    #[must_use]
    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget = budget;
        self
    }

    /// Check the limits can be honoured
    pub fn validate(&self) -> Result<(), BriefError> {
        if self.max_rounds < 1 {
            return Err(BriefError::InvalidInput("max_rounds must be at least 1".into()));
        }
        if self.per_domain_cap < 1 {
            return Err(BriefError::InvalidInput(
                "per_domain_cap must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_zero() || self.robots_timeout.is_zero() {
            return Err(BriefError::InvalidInput(
                "fetch and robots timeouts must be positive".into(),
            ));
        }
        if self.wall_clock_budget.is_zero() {
            return Err(BriefError::InvalidInput(
                "wall_clock_budget must be positive".into(),
            ));
        }
        if self.max_concurrent_fetches < 1 {
            return Err(BriefError::InvalidInput(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Trim and check a research topic
pub fn validate_topic(topic: &str) -> Result<String, BriefError> {
    let topic = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    if topic.is_empty() {
        return Err(BriefError::InvalidInput("topic is empty".into()));
    }
    if topic.chars().count() < 10 {
        tracing::warn!(%topic, "topic is very short; results may be unfocused");
    }
    Ok(topic)
}

/// Completion capability settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// OpenAI-compatible API root
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Per-call deadline
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token ceiling
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "openai/gpt-4o-mini".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            timeout: Duration::from_secs(90),
            temperature: 0.2,
            max_tokens: 2_048,
        }
    }
}

/// Search capability settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// SearxNG instance root
    pub base_url: String,
    /// Per-query deadline
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Queries searched concurrently
    pub max_concurrent_queries: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".into(),
            timeout: Duration::from_secs(20),
            max_concurrent_queries: 3,
        }
    }
}

/// HTTP fetch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// User-Agent header
    pub user_agent: String,
    /// Token matched against robots.txt user-agent groups
    pub robots_agent: String,
    /// Largest body read from the wire
    pub max_body_bytes: usize,
    /// Redirects followed per fetch
    pub max_redirects: usize,
    /// Extracted text is cut to this many characters
    pub max_text_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "BriefBot/0.1 (+https://github.com/example/brief)".into(),
            robots_agent: "BriefBot".into(),
            max_body_bytes: 10 * 1024 * 1024,
            max_redirects: 5,
            max_text_chars: 50_000,
        }
    }
}

/// Quality gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Documents need strictly more words than this
    pub min_words: usize,
    /// Distinct words / total words floor
    pub min_unique_ratio: f32,
    /// Reject pages showing error or interstitial boilerplate
    pub reject_boilerplate: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_words: 100,
            min_unique_ratio: 0.25,
            reject_boilerplate: true,
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefConfig {
    /// Run limits
    pub constraints: Constraints,
    /// Completion capability
    pub completion: CompletionConfig,
    /// Search capability
    pub search: SearchConfig,
    /// Page fetching
    pub fetch: FetchConfig,
    /// Quality gate
    pub quality: QualityConfig,
    /// Retry policy for external calls
    pub retry: RetryPolicy,
}

impl BriefConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, BriefError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BriefError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, BriefError> {
        toml::to_string_pretty(self).map_err(|e| BriefError::Config(e.to_string()))
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), BriefError> {
        self.constraints.validate()?;
        if self.completion.model.trim().is_empty() {
            return Err(BriefError::Config("completion.model is empty".into()));
        }
        if self.retry.max_attempts < 1 {
            return Err(BriefError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.quality.min_unique_ratio) {
            return Err(BriefError::Config(
                "quality.min_unique_ratio must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter: `Duration` as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
