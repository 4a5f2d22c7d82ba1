//! Content quality gate
//!
//! Rejects pages that carry no usable prose: empty bodies, stubs,
//! repetitive filler, and error or interstitial pages.

use brief_core::QualityConfig;
use std::collections::HashSet;

/// Phrases that mark error pages, bot walls and maintenance screens
const BOILERPLATE_PHRASES: &[&str] = &[
    "enable javascript",
    "access denied",
    "forbidden",
    "captcha",
    "page not found",
    "javascript is disabled",
    "cookies must be enabled",
    "please enable cookies",
    "this page requires javascript",
    "error 403",
    "error 404",
    "error 500",
    "service unavailable",
    "temporarily unavailable",
    "site maintenance",
];

/// Why a page was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QualityRejection {
    #[error("empty or whitespace-only content")]
    Empty,

    #[error("word count too low: {words} (minimum: {min})")]
    TooShort { words: usize, min: usize },

    #[error("unique word ratio too low: {ratio:.2} (minimum: {min:.2})")]
    Repetitive { ratio: f32, min: f32 },

    #[error("contains boilerplate/error phrases: {}", .phrases.join(", "))]
    Boilerplate { phrases: Vec<&'static str> },
}

/// Accept/reject thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGate {
    min_words: usize,
    min_unique_ratio: f32,
    reject_boilerplate: bool,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::from_config(&QualityConfig::default())
    }
}

impl QualityGate {
    /// Gate with configured thresholds
    #[must_use]
    pub fn from_config(config: &QualityConfig) -> Self {
        Self {
            min_words: config.min_words,
            min_unique_ratio: config.min_unique_ratio,
            reject_boilerplate: config.reject_boilerplate,
        }
    }

    /// Gate that accepts any non-empty text
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            min_words: 0,
            min_unique_ratio: 0.0,
            reject_boilerplate: false,
        }
    }

    /// Check extracted text
    pub fn check(&self, text: &str) -> Result<(), QualityRejection> {
        if text.trim().is_empty() {
            return Err(QualityRejection::Empty);
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.len() <= self.min_words {
            return Err(QualityRejection::TooShort {
                words: words.len(),
                min: self.min_words,
            });
        }

        let unique: HashSet<&str> = words.iter().copied().collect();
        #[allow(clippy::cast_precision_loss)]
        let ratio = unique.len() as f32 / words.len() as f32;
        if ratio < self.min_unique_ratio {
            return Err(QualityRejection::Repetitive {
                ratio,
                min: self.min_unique_ratio,
            });
        }

        if self.reject_boilerplate {
            let phrases: Vec<&'static str> = BOILERPLATE_PHRASES
                .iter()
                .copied()
                .filter(|p| lower.contains(p))
                .collect();
            if !phrases.is_empty() {
                return Err(QualityRejection::Boilerplate { phrases });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(words: usize) -> String {
        (0..words).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_empty_and_short() {
        let gate = QualityGate::default();
        assert_eq!(gate.check("  \n"), Err(QualityRejection::Empty));
        assert!(matches!(
            gate.check(&prose(100)),
            Err(QualityRejection::TooShort { words: 100, .. })
        ));
        assert!(gate.check(&prose(101)).is_ok());
    }

    #[test]
    fn rejects_repetitive_filler() {
        let filler = "buy now ".repeat(200);
        assert!(matches!(
            QualityGate::default().check(&filler),
            Err(QualityRejection::Repetitive { .. })
        ));
    }

    #[test]
    fn rejects_error_pages() {
        let text = format!("{} Access Denied by the edge network", prose(150));
        let err = QualityGate::default().check(&text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "contains boilerplate/error phrases: access denied"
        );
    }

    #[test]
    fn permissive_gate_only_needs_text() {
        assert!(QualityGate::permissive().check("short").is_ok());
        assert!(QualityGate::permissive().check("").is_err());
    }
}
