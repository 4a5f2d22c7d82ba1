//! Error types for Brief Core
//!
//! Two layers:
//! - `BriefError` for conditions that abort an operation outright
//!   (bad input, bad configuration, a report that would break coverage)
//! - `Failure` records for everything the pipeline survives; they are
//!   accumulated in `RunState::partial_failures` and never abort a run
//!   unless `fatal` is set

use crate::types::ClaimId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main Brief error type
#[derive(Debug, thiserror::Error)]
pub enum BriefError {
    /// Topic or constraints rejected before any work started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be assembled
    #[error("configuration error: {0}")]
    Config(String),

    /// Report finalization refused
    #[error("claim {claim} is in the report body without a citation and is not a listed gap")]
    CoverageViolation {
        /// Offending claim
        claim: ClaimId,
    },

    /// Reference numbers are not `1..=N` in first-use order
    #[error("reference numbering is not sequential: expected [{expected}], found [{found}]")]
    ReferenceNumbering {
        /// Number the position should carry
        expected: u32,
        /// Number it carries
        found: u32,
    },

    /// Filesystem error while loading configuration
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BriefError {
    /// Map onto the failure taxonomy
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            BriefError::InvalidInput(_) | BriefError::Config(_) | BriefError::Toml(_) => {
                FailureKind::InvalidInput
            }
            BriefError::CoverageViolation { .. } => FailureKind::UnresolvedClaim,
            BriefError::ReferenceNumbering { .. } => FailureKind::Internal,
            BriefError::Io(_) => FailureKind::InvalidInput,
        }
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    /// Whether the retry policy should try again
    fn is_retryable(&self) -> bool;
}

/// Where a failure was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    /// Input validation, before the run starts
    Input,
    /// Query planning
    Planning,
    /// Search, robots checks and fetching
    Retrieving,
    /// Claim extraction
    Synthesizing,
    /// Citation checks and follow-up queries
    Verifying,
    /// Report assembly
    Writing,
    /// Critique and revision decision
    Critiquing,
    /// Wall-clock budget trip
    Budget,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Input => "INPUT",
            FailureStage::Planning => "PLANNING",
            FailureStage::Retrieving => "RETRIEVING",
            FailureStage::Synthesizing => "SYNTHESIZING",
            FailureStage::Verifying => "VERIFYING",
            FailureStage::Writing => "WRITING",
            FailureStage::Critiquing => "CRITIQUING",
            FailureStage::Budget => "BUDGET",
        };
        f.write_str(name)
    }
}

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Empty topic or impossible constraints
    InvalidInput,
    /// Completion, search or critic capability did not answer
    ProviderUnavailable,
    /// Completion output needed repair or fell back to defaults
    MalformedOutput,
    /// Fetch or connection failure
    NetworkError,
    /// A per-call or per-task deadline elapsed
    Timeout,
    /// robots.txt forbids the URL
    RobotsDisallowed,
    /// Page fetched but rejected by the quality gate
    LowQuality,
    /// URL could not be parsed
    InvalidUrl,
    /// Wall-clock budget exhausted
    BudgetExceeded,
    /// Claim still lacks a supporting source at write time
    UnresolvedClaim,
    /// The pipeline broke one of its own invariants
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidInput => "INVALID_INPUT",
            FailureKind::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            FailureKind::MalformedOutput => "MALFORMED_OUTPUT",
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::RobotsDisallowed => "ROBOTS_DISALLOWED",
            FailureKind::LowQuality => "LOW_QUALITY",
            FailureKind::InvalidUrl => "INVALID_URL",
            FailureKind::BudgetExceeded => "BUDGET_EXCEEDED",
            FailureKind::UnresolvedClaim => "UNRESOLVED_CLAIM",
            FailureKind::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Stage that observed it
    pub stage: FailureStage,
    /// Taxonomy bucket
    pub kind: FailureKind,
    /// Human-readable detail
    pub detail: String,
    /// Whether the run was aborted
    pub fatal: bool,
    /// URL involved, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Failure {
    /// Survivable failure
    #[must_use]
    pub fn non_fatal(stage: FailureStage, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
            fatal: false,
            url: None,
        }
    }

    /// Run-aborting failure
    #[must_use]
    pub fn fatal(stage: FailureStage, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::non_fatal(stage, kind, detail)
        }
    }

    /// With the URL that triggered it
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.detail)?;
        if let Some(url) = &self.url {
            write!(f, " ({url})")?;
        }
        Ok(())
    }
}

impl From<BriefError> for Failure {
    fn from(err: BriefError) -> Self {
        let kind = err.kind();
        Failure::fatal(FailureStage::Input, kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_includes_stage_kind_and_url() {
        let failure = Failure::non_fatal(
            FailureStage::Retrieving,
            FailureKind::RobotsDisallowed,
            "blocked by robots.txt",
        )
        .with_url("https://example.com/private");

        assert_eq!(
            failure.to_string(),
            "[RETRIEVING] ROBOTS_DISALLOWED: blocked by robots.txt (https://example.com/private)"
        );
        assert!(!failure.fatal);
    }

    #[test]
    fn budget_stage_serializes_upper_case() {
        let failure = Failure::non_fatal(
            FailureStage::Budget,
            FailureKind::BudgetExceeded,
            "wall clock exhausted",
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["stage"], "BUDGET");
        assert_eq!(json["kind"], "BUDGET_EXCEEDED");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn invalid_input_converts_to_fatal_failure() {
        let failure: Failure = BriefError::InvalidInput("topic is empty".into()).into();
        assert!(failure.fatal);
        assert_eq!(failure.kind, FailureKind::InvalidInput);
        assert_eq!(failure.stage, FailureStage::Input);
    }
}
