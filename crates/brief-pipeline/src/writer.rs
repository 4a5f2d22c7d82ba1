//! WRITING: claims to a cited report
//!
//! The completion backend only writes the narrative. Everything the
//! coverage rule depends on is assembled here deterministically:
//! reference numbering, the Key Findings list, the Known Gaps list and
//! the coverage line.

use crate::gateway::{Completion, CompletionGateway};
use crate::prompts;
use crate::verifier::Verification;
use brief_core::{
    source_key, Claim, Coverage, Failure, FailureKind, FailureStage, Finding, Gap, Report,
    RunState, MAX_LISTED_GAPS,
};
use brief_extract::{extract_as, DraftBody};
use chrono::Utc;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d{1,4})\]").expect("valid marker regex"));

/// Everything a write pass needs, detached from the run state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriterInput {
    /// Research topic
    pub topic: String,
    /// Supported claims with their supporting URLs
    pub supported: Vec<(Claim, Vec<String>)>,
    /// Claims with no supporting document
    pub unsupported: Vec<Claim>,
    /// Distinct logical sources among held documents
    pub source_count: usize,
    /// Write pass number (0 for the first draft)
    pub revision: u32,
    /// Critique instructions for a revision pass
    pub revision_notes: Vec<String>,
}

impl WriterInput {
    /// Snapshot the parts of `state` the writer reads
    #[must_use]
    pub fn from_state(state: &RunState, verification: &Verification, revision_notes: Vec<String>) -> Self {
        let mut supported = Vec::new();
        let mut unsupported = Vec::new();
        for claim in &state.claims {
            match verification.support_for(claim.id) {
                Some(support) if support.is_supported() => {
                    supported.push((claim.clone(), support.supporting_urls.clone()));
                }
                _ => unsupported.push(claim.clone()),
            }
        }
        Self {
            topic: state.topic.clone(),
            supported,
            unsupported,
            source_count: state
                .documents
                .iter()
                .map(|d| source_key(&d.domain))
                .collect::<HashSet<_>>()
                .len(),
            revision: state.revision_count,
            revision_notes,
        }
    }
}

/// Result of a write pass
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    /// Finalized report
    pub report: Report,
    /// Non-fatal problems met while writing
    pub failures: Vec<Failure>,
}

/// Write a report
///
/// `Err` when the completion backend is unreachable for the run, or when
/// the assembled report would break the coverage rule.
pub async fn write(gateway: &CompletionGateway, input: WriterInput) -> Result<Written, Failure> {
    let (findings, references) = number_references(&input.supported);
    let mut failures = Vec::new();

    let draft = if findings.is_empty() {
        None
    } else {
        let cited: Vec<(String, String)> = findings
            .iter()
            .map(|f| (f.text.clone(), markers(&f.markers)))
            .collect();
        let request = prompts::draft(&input.topic, &cited, &input.revision_notes);
        match gateway.complete(&request, FailureStage::Writing).await? {
            Completion::Text(raw) => {
                let extracted = extract_as::<DraftBody>(&raw);
                if !extracted.ok() {
                    failures.push(Failure::non_fatal(
                        FailureStage::Writing,
                        FailureKind::MalformedOutput,
                        format!("narrative recovered via {:?}", extracted.strategy),
                    ));
                }
                Some(extracted.value).filter(|d| !d.body.trim().is_empty())
            }
            Completion::Degraded(failure) => {
                failures.push(failure);
                None
            }
        }
    };

    let report = assemble(&input, draft, findings, references);
    report.finalize_check().map_err(|err| {
        tracing::error!("refusing to finalize report: {err}");
        Failure::fatal(FailureStage::Writing, err.kind(), err.to_string())
    })?;
    tracing::info!(
        revision = report.revision,
        findings = report.findings.len(),
        gaps = report.gaps.len() + report.omitted_gaps,
        references = report.references.len(),
        "report written"
    );
    Ok(Written { report, failures })
}

/// Number references 1..N in order of first use
#[must_use]
pub fn number_references(supported: &[(Claim, Vec<String>)]) -> (Vec<Finding>, IndexMap<u32, String>) {
    let mut references: IndexMap<u32, String> = IndexMap::new();
    let mut numbers: IndexMap<String, u32> = IndexMap::new();
    let mut findings = Vec::with_capacity(supported.len());
    for (claim, urls) in supported {
        let mut marks = Vec::new();
        for url in urls {
            let next = u32::try_from(numbers.len() + 1).unwrap_or(u32::MAX);
            let number = *numbers.entry(url.clone()).or_insert_with(|| {
                references.insert(next, url.clone());
                next
            });
            if !marks.contains(&number) {
                marks.push(number);
            }
        }
        findings.push(Finding {
            claim_id: claim.id,
            text: claim.text.clone(),
            markers: marks,
        });
    }
    (findings, references)
}

/// Drop `[n]` markers that do not name a reference
///
/// Only the whitespace around a dropped marker changes: a space left
/// before punctuation or another space goes, and indentation survives.
#[must_use]
pub fn strip_unknown_markers(text: &str, reference_count: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in MARKER.captures_iter(text) {
        let valid = caps[1]
            .parse::<usize>()
            .is_ok_and(|n| (1..=reference_count).contains(&n));
        let Some(marker) = caps.get(0) else { continue };
        if valid {
            continue;
        }
        out.push_str(&text[last..marker.start()]);
        let mut end = marker.end();
        let line = out.rsplit('\n').next().unwrap_or_default();
        if line.trim().is_empty() {
            let rest = &text[end..];
            end += rest.len() - rest.trim_start_matches([' ', '\t']).len();
        } else if text[end..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || ".,;:!?)".contains(c))
        {
            let kept = out.trim_end_matches([' ', '\t']).len();
            out.truncate(kept);
        }
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

fn markers(numbers: &[u32]) -> String {
    numbers.iter().map(|n| format!("[{n}]")).collect()
}

fn assemble(
    input: &WriterInput,
    draft: Option<DraftBody>,
    findings: Vec<Finding>,
    references: IndexMap<u32, String>,
) -> Report {
    let coverage = Coverage {
        claims_total: input.supported.len() + input.unsupported.len(),
        claims_covered: input.supported.len(),
    };
    let (title, narrative) = match draft {
        Some(draft) => (
            draft
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| default_title(&input.topic)),
            strip_unknown_markers(strip_heading(&draft.body), references.len()),
        ),
        None => (default_title(&input.topic), fallback_narrative(input, &coverage)),
    };

    let gaps: Vec<Gap> = input
        .unsupported
        .iter()
        .take(MAX_LISTED_GAPS)
        .map(|c| Gap {
            claim_id: c.id,
            text: c.text.clone(),
        })
        .collect();
    let omitted_gaps = input.unsupported.len().saturating_sub(MAX_LISTED_GAPS);

    let mut body = format!("# {}\n\n{}\n\n## Key Findings\n\n", title.trim(), narrative.trim());
    if findings.is_empty() {
        body.push_str("No findings could be traced to the retrieved sources.\n");
    }
    for finding in &findings {
        let _ = writeln!(body, "- {} {}", finding.text, markers(&finding.markers));
    }

    if !gaps.is_empty() {
        body.push_str(
            "\n## Known Gaps\n\nThe following claims could not be traced to a retrieved source:\n\n",
        );
        for gap in &gaps {
            let _ = writeln!(body, "- {}", gap.text);
        }
        if omitted_gaps > 0 {
            let _ = writeln!(body, "- …and {omitted_gaps} more");
        }
    }

    let _ = write!(
        body,
        "\n## Coverage\n\n{} of {} claims cited ({:.0}%) across {} sources.\n",
        coverage.claims_covered,
        coverage.claims_total,
        coverage.ratio() * 100.0,
        input.source_count
    );

    Report {
        title: title.trim().to_string(),
        body_text: body,
        references,
        coverage,
        findings,
        gaps,
        omitted_gaps,
        revision: input.revision,
        created_at: Utc::now(),
    }
}

fn default_title(topic: &str) -> String {
    format!("Research Brief: {topic}")
}

/// Drop a leading markdown heading; the writer adds its own title
fn strip_heading(body: &str) -> &str {
    let body = body.trim_start();
    if body.starts_with("# ") {
        body.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

fn fallback_narrative(input: &WriterInput, coverage: &Coverage) -> String {
    format!(
        "This brief summarizes what the retrieved sources say about {}. \
         It draws on {} sources; {} of {} claims could be traced to a source.",
        input.topic, input.source_count, coverage.claims_covered, coverage.claims_total
    )
}
