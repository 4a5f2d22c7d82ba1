//! Error types for retrieval

use brief_core::{FailureKind, Retryable};
use std::time::Duration;

/// Why a single URL produced no document
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// URL could not be parsed or is not http(s)
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Connection, TLS or protocol failure
    #[error("network error: {0}")]
    Network(String),

    /// Deadline elapsed
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("http status {status}")]
    HttpStatus {
        /// Status code returned
        status: u16,
    },

    /// Content type the extractor cannot read
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// HTML could not be rewritten into text
    #[error("text extraction failed: {0}")]
    Extraction(String),
}

impl FetchError {
    /// Map onto the failure taxonomy
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::InvalidUrl(_) => FailureKind::InvalidUrl,
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::UnsupportedContentType(_) | FetchError::Extraction(_) => {
                FailureKind::LowQuality
            }
            FetchError::Network(_) | FetchError::HttpStatus { .. } => FailureKind::NetworkError,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
