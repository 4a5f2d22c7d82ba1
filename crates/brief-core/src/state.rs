//! Per-run state
//!
//! `RunState` is owned by exactly one orchestrator and mutated only from
//! its task; concurrent fetch tasks hand their results back instead of
//! touching it.

use crate::config::Constraints;
use crate::error::Failure;
use crate::report::Report;
use crate::stage::Stage;
use crate::types::{Citation, Claim, ClaimId, Document, RunId, SearchResult};
use crate::urls::{normalize_url_str, source_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Counters collected over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Search queries issued
    pub queries_executed: usize,
    /// Search results kept after deduplication
    pub search_results: usize,
    /// URLs admitted for fetching
    pub urls_attempted: usize,
    /// URLs that became documents
    pub urls_fetched: usize,
    /// URLs that failed or were rejected
    pub urls_failed: usize,
    /// Completion calls issued
    pub completion_calls: usize,
    /// Completion calls that returned text
    pub completion_successes: usize,
    /// Documents held
    pub documents: usize,
    /// Claims synthesized
    pub claims: usize,
    /// Distinct logical sources among held documents
    pub domain_diversity: usize,
    /// Retrieval rounds run
    pub rounds: u32,
    /// Report write passes, the first draft included
    pub write_passes: u32,
    /// Wall-clock time of the run
    pub elapsed_ms: u64,
}

/// Everything known about one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier
    pub run_id: RunId,
    /// Normalized research topic
    pub topic: String,
    /// Limits in force
    pub constraints: Constraints,
    /// Current stage
    pub stage: Stage,
    /// Current retrieval round, counted from 0
    pub round: u32,
    /// Every query planned or generated so far, in order
    pub queries: Vec<String>,
    /// Prefix of `queries` already sent to search
    pub executed_queries: usize,
    /// Deduplicated search results
    pub search_results: Vec<SearchResult>,
    /// URLs already handed to retrieval (normalized)
    pub attempted_urls: BTreeSet<String>,
    /// Documents that passed the quality gate
    pub documents: Vec<Document>,
    /// Synthesized claims
    pub claims: Vec<Claim>,
    /// One citation per claim
    pub citations: Vec<Citation>,
    /// Claims with no held supporting document after the last verification
    pub unsupported: BTreeSet<ClaimId>,
    /// Latest report
    pub report: Option<Report>,
    /// Critique-driven rewrites performed
    pub revision_count: u32,
    /// Survivable failures, in the order they happened
    pub partial_failures: Vec<Failure>,
    /// Counters
    pub metrics: RunMetrics,
    /// Run start
    pub started_at: DateTime<Utc>,
    next_claim: u32,
}

impl RunState {
    /// Fresh state for a topic
    #[must_use]
    pub fn new(topic: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            run_id: RunId::new(),
            topic: topic.into(),
            constraints,
            stage: Stage::Planning,
            round: 0,
            queries: Vec::new(),
            executed_queries: 0,
            search_results: Vec::new(),
            attempted_urls: BTreeSet::new(),
            documents: Vec::new(),
            claims: Vec::new(),
            citations: Vec::new(),
            unsupported: BTreeSet::new(),
            report: None,
            revision_count: 0,
            partial_failures: Vec::new(),
            metrics: RunMetrics::default(),
            started_at: Utc::now(),
            next_claim: 1,
        }
    }

    /// Allocate the next claim id
    pub fn next_claim_id(&mut self) -> ClaimId {
        let id = ClaimId(self.next_claim);
        self.next_claim += 1;
        id
    }

    /// Record a survivable failure
    pub fn record(&mut self, failure: Failure) {
        tracing::warn!(
            run = %self.run_id,
            stage = %failure.stage,
            kind = %failure.kind,
            "{}",
            failure.detail
        );
        self.partial_failures.push(failure);
    }

    /// Append queries not already known (case-insensitive); returns how many were added
    pub fn add_queries<I, S>(&mut self, queries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: HashSet<String> = self.queries.iter().map(|q| q.to_lowercase()).collect();
        let before = self.queries.len();
        for query in queries {
            let query: String = query.into();
            let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
            if !query.is_empty() && known.insert(query.to_lowercase()) {
                self.queries.push(query);
            }
        }
        self.queries.len() - before
    }

    /// Queries not yet sent to search
    #[must_use]
    pub fn pending_queries(&self) -> &[String] {
        &self.queries[self.executed_queries.min(self.queries.len())..]
    }

    /// Mark every pending query as executed
    pub fn mark_queries_executed(&mut self) {
        self.executed_queries = self.queries.len();
    }

    /// Append results whose normalized URL is new; returns the ones added
    pub fn merge_search_results(&mut self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut seen: HashSet<String> = self
            .search_results
            .iter()
            .filter_map(|r| normalize_url_str(&r.url))
            .collect();
        let mut added = Vec::new();
        for mut result in results {
            let Some(normalized) = normalize_url_str(&result.url) else {
                continue;
            };
            if seen.insert(normalized.clone()) {
                result.url = normalized;
                added.push(result);
            }
        }
        self.search_results.extend(added.iter().cloned());
        self.metrics.search_results = self.search_results.len();
        added
    }

    /// Add documents not already held
    pub fn add_documents(&mut self, documents: Vec<Document>) -> usize {
        let mut held: HashSet<String> = self.documents.iter().map(|d| d.url.clone()).collect();
        let before = self.documents.len();
        for doc in documents {
            if held.insert(doc.url.clone()) {
                self.documents.push(doc);
            }
        }
        self.metrics.documents = self.documents.len();
        self.metrics.domain_diversity = self
            .documents
            .iter()
            .map(|d| source_key(&d.domain))
            .collect::<HashSet<_>>()
            .len();
        self.documents.len() - before
    }

    /// Citation for a claim
    #[must_use]
    pub fn citation_for(&self, id: ClaimId) -> Option<&Citation> {
        self.citations.iter().find(|c| c.claim_id == id)
    }

    /// Mutable citation for a claim
    pub fn citation_for_mut(&mut self, id: ClaimId) -> Option<&mut Citation> {
        self.citations.iter_mut().find(|c| c.claim_id == id)
    }

    /// Add a claim and its citation
    pub fn push_claim(&mut self, claim: Claim, urls: Vec<String>) {
        self.citations.push(Citation::new(claim.id, urls));
        self.claims.push(claim);
        self.metrics.claims = self.claims.len();
    }

    /// Milliseconds since the run started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        u64::try_from(elapsed.num_milliseconds()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClaimKind, FetchStatus};

    fn doc(url: &str, domain: &str) -> Document {
        Document {
            url: url.into(),
            title: String::new(),
            text: String::new(),
            domain: domain.into(),
            fetch_status: FetchStatus::default(),
        }
    }

    #[test]
    fn claim_ids_are_sequential() {
        let mut state = RunState::new("topic", Constraints::default());
        assert_eq!(state.next_claim_id(), ClaimId(1));
        assert_eq!(state.next_claim_id(), ClaimId(2));
    }

    #[test]
    fn queries_dedup_case_insensitively() {
        let mut state = RunState::new("topic", Constraints::default());
        assert_eq!(state.add_queries(["Battery cost", "battery  cost", ""]), 1);
        assert_eq!(state.pending_queries().len(), 1);
        state.mark_queries_executed();
        assert!(state.pending_queries().is_empty());
        assert_eq!(state.add_queries(["battery recycling"]), 1);
        assert_eq!(state.pending_queries(), ["battery recycling".to_string()]);
    }

    #[test]
    fn search_results_dedup_by_normalized_url() {
        let mut state = RunState::new("topic", Constraints::default());
        let added = state.merge_search_results(vec![
            SearchResult::new("https://Example.com/a/", "A", 1),
            SearchResult::new("https://example.com/a#x", "A again", 2),
            SearchResult::new("not a url", "bad", 3),
        ]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].url, "https://example.com/a");
        let again = state.merge_search_results(vec![SearchResult::new(
            "https://example.com/a?utm_source=feed",
            "A",
            1,
        )]);
        assert!(again.is_empty());
    }

    #[test]
    fn documents_update_diversity_with_mirrors_collapsed() {
        let mut state = RunState::new("topic", Constraints::default());
        state.add_documents(vec![
            doc("https://www.example.com/1", "www.example.com"),
            doc("https://m.example.com/2", "m.example.com"),
            doc("https://other.org/3", "other.org"),
            doc("https://other.org/3", "other.org"),
        ]);
        assert_eq!(state.documents.len(), 3);
        assert_eq!(state.metrics.domain_diversity, 2);
        assert_eq!(state.documents.iter().filter(|d| d.domain == "other.org").count(), 1);
    }

    #[test]
    fn push_claim_creates_citation() {
        let mut state = RunState::new("topic", Constraints::default());
        let id = state.next_claim_id();
        state.push_claim(
            Claim::new(id, "x", ClaimKind::Fact, 0.9),
            vec!["https://a.example/".into()],
        );
        assert_eq!(state.citation_for(id).map(|c| c.urls.len()), Some(1));
        assert_eq!(state.metrics.claims, 1);
    }
}
