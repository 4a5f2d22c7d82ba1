//! Report model
//!
//! A report is valid only when every claim shown under its findings is
//! either backed by a numbered reference or listed as a known gap.
//! `finalize_check` enforces that before a report leaves the writer.

use crate::error::BriefError;
use crate::types::ClaimId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Gaps listed individually before the remainder is summarized as a count
pub const MAX_LISTED_GAPS: usize = 10;

/// Claim coverage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// All claims synthesized
    pub claims_total: usize,
    /// Claims with at least one held supporting document
    pub claims_covered: usize,
}

impl Coverage {
    /// Covered fraction, 1.0 for an empty claim set
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.claims_total == 0 {
            1.0
        } else {
            self.claims_covered as f64 / self.claims_total as f64
        }
    }
}

/// A supported claim as it appears under findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Claim shown
    pub claim_id: ClaimId,
    /// Claim text
    pub text: String,
    /// Reference numbers cited for it
    pub markers: Vec<u32>,
}

/// Claim that could not be traced to a held source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Unsupported claim
    pub claim_id: ClaimId,
    /// Claim text
    pub text: String,
}

/// Final research brief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Headline
    pub title: String,
    /// Rendered body with `[n]` markers
    pub body_text: String,
    /// Reference number to URL, in first-use order
    pub references: IndexMap<u32, String>,
    /// Claim coverage
    pub coverage: Coverage,
    /// Supported claims and their markers
    pub findings: Vec<Finding>,
    /// Listed known gaps
    pub gaps: Vec<Gap>,
    /// Unsupported claims beyond the listed ones
    pub omitted_gaps: usize,
    /// 0 for the first draft, incremented per revision
    pub revision: u32,
    /// Assembly time
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Refuse reports that would break the coverage rule
    pub fn finalize_check(&self) -> Result<(), BriefError> {
        for finding in &self.findings {
            let cited = !finding.markers.is_empty()
                && finding
                    .markers
                    .iter()
                    .all(|m| self.references.contains_key(m));
            let gap = self.gaps.iter().any(|g| g.claim_id == finding.claim_id);
            if !cited && !gap {
                return Err(BriefError::CoverageViolation {
                    claim: finding.claim_id,
                });
            }
        }
        for (expected, number) in (1u32..).zip(self.references.keys()) {
            if *number != expected {
                return Err(BriefError::ReferenceNumbering {
                    expected,
                    found: *number,
                });
            }
        }
        Ok(())
    }

    /// Body followed by the numbered reference list
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = self.body_text.trim_end().to_string();
        if !self.references.is_empty() {
            out.push_str("\n\n## References\n\n");
            for (number, url) in &self.references {
                let _ = writeln!(out, "{number}. {url}");
            }
        }
        out
    }
}
