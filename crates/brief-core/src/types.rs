//! Core data model
//!
//! Defines what flows between pipeline stages:
//! - Search results from the search capability
//! - Documents that passed retrieval and the quality gate
//! - Claims synthesized from documents, and the citations backing them

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claim identifier, unique within a run
///
/// Allocated sequentially by `RunState::next_claim_id` and rendered as
/// `C1`, `C2`, ... so it can be quoted back in prompts and gap listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub u32);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// One hit returned by the search capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result URL as returned by the provider
    pub url: String,
    /// Result title
    pub title: String,
    /// Provider snippet
    pub snippet: String,
    /// 1-based rank within the query's result list
    pub rank: u32,
}

impl SearchResult {
    /// Create a search result
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, rank: u32) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
            rank,
        }
    }

    /// With snippet text
    #[inline]
    #[must_use]
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// Outcome of the HTTP fetch behind a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStatus {
    /// HTTP status code
    pub http_status: u16,
    /// Content-Type header, if any
    pub content_type: Option<String>,
    /// Body or text was cut to the configured maximum
    pub truncated: bool,
}

impl Default for FetchStatus {
    fn default() -> Self {
        Self {
            http_status: 200,
            content_type: None,
            truncated: false,
        }
    }
}

/// A fetched page that passed the quality gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Normalized URL
    pub url: String,
    /// Page title (falls back to the URL)
    pub title: String,
    /// Cleaned plain text
    pub text: String,
    /// Lowercased host
    pub domain: String,
    /// Fetch details
    pub fetch_status: FetchStatus,
}

/// How a claim is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    /// Verifiable statement of fact
    #[default]
    Fact,
    /// Projection, figure or approximation
    Estimate,
    /// Attributed view or judgement
    Opinion,
}

impl ClaimKind {
    /// Map a free-form label onto a kind
    ///
    /// Unknown labels are treated as facts.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "estimate" | "estimation" | "projection" | "forecast" | "prediction" => {
                ClaimKind::Estimate
            }
            "opinion" | "view" | "judgement" | "judgment" | "analysis" | "interpretation" => {
                ClaimKind::Opinion
            }
            _ => ClaimKind::Fact,
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimKind::Fact => "fact",
            ClaimKind::Estimate => "estimate",
            ClaimKind::Opinion => "opinion",
        };
        f.write_str(s)
    }
}

/// Atomic assertion synthesized from documents
///
/// Immutable once created; only its `Citation` may grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Run-unique identifier
    pub id: ClaimId,
    /// Claim text
    pub text: String,
    /// Framing
    pub kind: ClaimKind,
    /// Model confidence in [0, 1]
    pub confidence: f32,
}

impl Claim {
    /// Create a claim, clamping confidence into [0, 1]
    #[must_use]
    pub fn new(id: ClaimId, text: impl Into<String>, kind: ClaimKind, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.5
        };
        Self {
            id,
            text: text.into(),
            kind,
            confidence,
        }
    }
}

/// Link from a claim to the URLs offered as its support
///
/// Support is only real when one of the URLs is a held document; the
/// verifier decides that, not the citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Claim being supported
    pub claim_id: ClaimId,
    /// Candidate supporting URLs, in first-seen order
    pub urls: Vec<String>,
}

impl Citation {
    /// Create a citation
    #[must_use]
    pub fn new(claim_id: ClaimId, urls: Vec<String>) -> Self {
        let mut citation = Self {
            claim_id,
            urls: Vec::with_capacity(urls.len()),
        };
        citation.merge_urls(urls);
        citation
    }

    /// Append URLs not already present
    pub fn merge_urls(&mut self, urls: impl IntoIterator<Item = String>) {
        for url in urls {
            if !url.is_empty() && !self.urls.contains(&url) {
                self.urls.push(url);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_id_renders_with_prefix() {
        assert_eq!(ClaimId(7).to_string(), "C7");
    }

    #[test]
    fn claim_confidence_is_clamped() {
        let high = Claim::new(ClaimId(1), "x", ClaimKind::Fact, 3.0);
        let nan = Claim::new(ClaimId(2), "y", ClaimKind::Fact, f32::NAN);
        assert!((high.confidence - 1.0).abs() < f32::EPSILON);
        assert!((nan.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn claim_kind_labels() {
        assert_eq!(ClaimKind::from_label("Statistical"), ClaimKind::Fact);
        assert_eq!(ClaimKind::from_label(" projection "), ClaimKind::Estimate);
        assert_eq!(ClaimKind::from_label("opinion"), ClaimKind::Opinion);
    }

    #[test]
    fn citation_merge_skips_duplicates_and_empties() {
        let mut citation = Citation::new(
            ClaimId(1),
            vec!["https://a.example/".into(), "https://a.example/".into()],
        );
        citation.merge_urls(vec![String::new(), "https://b.example/".into()]);
        assert_eq!(
            citation.urls,
            vec!["https://a.example/".to_string(), "https://b.example/".to_string()]
        );
    }
}
