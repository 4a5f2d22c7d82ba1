//! PLANNING: topic to search queries

use crate::gateway::{Completion, CompletionGateway};
use crate::prompts;
use brief_core::{Failure, FailureKind, FailureStage};
use brief_extract::{extract_as, ResearchPlan};
use std::collections::HashSet;

/// Most queries a plan may contribute
pub const MAX_QUERIES: usize = 8;

/// Planning result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Questions the brief should answer
    pub sub_questions: Vec<String>,
    /// Deduplicated queries, at most `MAX_QUERIES`
    pub queries: Vec<String>,
    /// Non-fatal problems met while planning
    pub failures: Vec<Failure>,
}

/// Ask for a research plan, falling back to topic-derived queries
///
/// `Err` only when the completion backend is unreachable for the run.
pub async fn plan(gateway: &CompletionGateway, topic: &str) -> Result<Plan, Failure> {
    let request = prompts::plan(topic, MAX_QUERIES);
    let mut out = Plan::default();

    let raw = match gateway.complete(&request, FailureStage::Planning).await? {
        Completion::Text(text) => Some(text),
        Completion::Degraded(failure) => {
            out.failures.push(failure);
            None
        }
    };

    if let Some(raw) = raw {
        let extracted = extract_as::<ResearchPlan>(&raw);
        if !extracted.ok() {
            out.failures.push(Failure::non_fatal(
                FailureStage::Planning,
                FailureKind::MalformedOutput,
                format!("research plan recovered via {:?}", extracted.strategy),
            ));
        }
        out.sub_questions = extracted.value.sub_questions;
        out.queries = normalize_queries(extracted.value.queries);
    }

    if out.queries.is_empty() {
        tracing::warn!(topic, "plan produced no queries; using topic-derived queries");
        if !has_malformed(&out.failures) {
            out.failures.push(Failure::non_fatal(
                FailureStage::Planning,
                FailureKind::MalformedOutput,
                "research plan contained no queries",
            ));
        }
        out.queries = fallback_queries(topic);
    }
    tracing::info!(queries = out.queries.len(), sub_questions = out.sub_questions.len(), "plan ready");
    Ok(out)
}

fn has_malformed(failures: &[Failure]) -> bool {
    failures.iter().any(|f| f.kind == FailureKind::MalformedOutput)
}

/// Queries that need no completion backend
#[must_use]
pub fn fallback_queries(topic: &str) -> Vec<String> {
    normalize_queries(vec![
        topic.to_string(),
        format!("{topic} overview"),
        format!("{topic} recent developments"),
    ])
}

/// Collapse whitespace, drop blanks and case-insensitive duplicates, cap
#[must_use]
pub fn normalize_queries(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .take(MAX_QUERIES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn queries_are_deduplicated_and_capped() {
        let raw: Vec<String> = ["a  b", "A B", "", "c"]
            .into_iter()
            .map(String::from)
            .chain((0..20).map(|i| format!("q{i}")))
            .collect();
        let out = normalize_queries(raw);
        assert_eq!(out.len(), MAX_QUERIES);
        assert_eq!(&out[..3], &["a b".to_string(), "c".into(), "q0".into()]);
    }

    #[test]
    fn fallback_is_topic_derived() {
        assert_eq!(
            fallback_queries("solid state batteries"),
            vec![
                "solid state batteries".to_string(),
                "solid state batteries overview".into(),
                "solid state batteries recent developments".into(),
            ]
        );
    }
}
