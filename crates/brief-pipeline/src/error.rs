//! Error types for external collaborators

use brief_core::{FailureKind, Retryable};

/// Failure talking to a completion, search or critic backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No connection could be made
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// Call exceeded its deadline
    #[error("provider call timed out after {duration_ms}ms")]
    Timeout {
        /// Deadline that elapsed
        duration_ms: u64,
    },

    /// Provider asked us to slow down
    #[error("rate limited by provider")]
    RateLimited,

    /// Non-success HTTP status
    #[error("provider returned http {status}")]
    Http {
        /// Status code returned
        status: u16,
    },

    /// Response arrived but could not be read
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Provider is misconfigured (missing key, bad base URL)
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// No connection at all, as opposed to a bad answer
    #[inline]
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_) | ProviderError::Timeout { .. })
    }

    /// Map onto the failure taxonomy
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Timeout { .. } => FailureKind::Timeout,
            ProviderError::InvalidResponse(_) => FailureKind::MalformedOutput,
            _ => FailureKind::ProviderUnavailable,
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Unreachable(_)
            | ProviderError::Timeout { .. }
            | ProviderError::RateLimited => true,
            ProviderError::Http { status } => *status >= 500,
            ProviderError::InvalidResponse(_) | ProviderError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { duration_ms: 0 }
        } else if err.is_connect() {
            ProviderError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status.as_u16())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }
}

impl ProviderError {
    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ProviderError::RateLimited,
            401 | 403 => ProviderError::Config(format!("credentials rejected (http {status})")),
            _ => ProviderError::Http { status },
        }
    }
}
