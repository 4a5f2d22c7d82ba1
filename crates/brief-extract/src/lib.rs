//! Brief Extract - structured output from free-form completion text
//!
//! Completion responses are untrusted text. `extract` turns them into a
//! typed record of the requested shape through a fixed cascade:
//!
//! 1. Parse the whole response as JSON
//! 2. Parse JSON-looking spans after stripping prose and code fences
//! 3. Repair lexical damage (trailing commas, raw control characters)
//! 4. Close a truncated structure, dropping the incomplete tail
//! 5. Recover fields one by one with patterns
//! 6. Fall back to the empty default
//!
//! Steps 1-3 yield `ok = true`. Steps 4-6 lose information and yield
//! `ok = false`, even when they recover usable data. Extraction never
//! panics and its cost is linear in the (capped) input size.
//!
//! # Example
//!
//! ```rust
//! use brief_extract::{extract_as, ClaimSet};
//!
//! let out = extract_as::<ClaimSet>(r#"Here you go: {"claims": [{"text": "X", "sources": ["S1"]},]}"#);
//! assert!(out.ok());
//! assert_eq!(out.value.claims[0].text, "X");
//! ```

#![warn(unreachable_pub)]

mod heuristic;
mod repair;
pub mod shape;

pub use shape::{
    ClaimDraft, ClaimSet, Critique, DraftBody, ExpectedShape, Record, ResearchPlan, Shape,
    PUBLISHABLE_SCORE,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Responses longer than this are cut before extraction
pub const MAX_INPUT_BYTES: usize = 256 * 1024;

/// Cascade step that produced the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Whole response parsed as is
    Direct,
    /// Parsed after removing surrounding prose or fences
    Unwrapped,
    /// Parsed after lexical repair
    Repaired,
    /// Parsed after closing a truncated structure
    Truncated,
    /// Recovered field by field
    Heuristic,
    /// Nothing usable; empty default
    Fallback,
}

impl Strategy {
    /// Whether the value is a faithful parse
    #[inline]
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Strategy::Direct | Strategy::Unwrapped | Strategy::Repaired)
    }
}

/// Typed extraction result
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    /// Best value recovered
    pub value: T,
    /// How it was recovered
    pub strategy: Strategy,
}

impl<T> Extracted<T> {
    /// Whether the value is a faithful parse
    #[inline]
    #[must_use]
    pub fn ok(&self) -> bool {
        self.strategy.is_ok()
    }

    /// Whether the value is the empty default
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.strategy == Strategy::Fallback
    }
}

/// Shape-erased extraction result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Value recovered
    pub record: Record,
    /// How it was recovered
    pub strategy: Strategy,
}

impl Extraction {
    /// Whether the value is a faithful parse
    #[inline]
    #[must_use]
    pub fn ok(&self) -> bool {
        self.strategy.is_ok()
    }
}

/// Extract a record of `shape` from `raw`
#[must_use]
pub fn extract(raw: &str, shape: ExpectedShape) -> Extraction {
    fn erase<T: Shape>(e: Extracted<T>) -> Extraction {
        Extraction {
            record: e.value.into_record(),
            strategy: e.strategy,
        }
    }
    match shape {
        ExpectedShape::Plan => erase(extract_as::<ResearchPlan>(raw)),
        ExpectedShape::Claims => erase(extract_as::<ClaimSet>(raw)),
        ExpectedShape::Critique => erase(extract_as::<Critique>(raw)),
        ExpectedShape::Draft => erase(extract_as::<DraftBody>(raw)),
    }
}

/// Extract a typed record from `raw`
#[must_use]
pub fn extract_as<T: Shape>(raw: &str) -> Extracted<T> {
    let text = cap_input(raw).trim();
    let done = |value: T, strategy: Strategy| {
        tracing::debug!(shape = ?T::KIND, ?strategy, "extracted structured output");
        Extracted { value, strategy }
    };

    if let Some(v) = parse_as::<T>(text) {
        return done(v, Strategy::Direct);
    }

    let candidates = repair::candidates(text);
    for candidate in &candidates {
        if let Some(v) = parse_as::<T>(candidate) {
            return done(v, Strategy::Unwrapped);
        }
    }

    let repaired: Vec<String> = candidates
        .iter()
        .map(|c| repair::lexical_repair(c))
        .collect();
    for candidate in &repaired {
        if let Some(v) = parse_as::<T>(candidate) {
            return done(v, Strategy::Repaired);
        }
    }

    for candidate in &repaired {
        if let Some(v) = repair::close_truncated(candidate).and_then(|c| parse_as::<T>(&c)) {
            return done(v, Strategy::Truncated);
        }
    }

    if let Some(v) = T::from_fields(text) {
        return done(v, Strategy::Heuristic);
    }

    tracing::debug!(shape = ?T::KIND, bytes = raw.len(), "no structured output recovered");
    Extracted {
        value: T::default(),
        strategy: Strategy::Fallback,
    }
}

fn parse_as<T: Shape>(text: &str) -> Option<T> {
    let value: Value = serde_json::from_str(text).ok()?;
    T::from_value(&value)
}

/// Cut to `MAX_INPUT_BYTES` on a char boundary
fn cap_input(raw: &str) -> &str {
    if raw.len() <= MAX_INPUT_BYTES {
        return raw;
    }
    let mut end = MAX_INPUT_BYTES;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}
