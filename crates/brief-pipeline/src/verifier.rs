//! VERIFYING: citation coverage and remediation queries
//!
//! A claim is supported when its citation names at least one URL of a
//! document the run holds. Mirror hosts count once towards a claim's
//! source diversity but each still supports it.

use brief_core::{normalize_url_str, source_key, Citation, Claim, ClaimId, Document};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Most follow-up queries one verification may propose
pub const MAX_FOLLOW_UPS: usize = 5;

/// Key terms appended to the topic in a follow-up query
const FOLLOW_UP_TERMS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "might",
    "more", "most", "much", "must", "my", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

/// Support found for one claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSupport {
    /// Claim checked
    pub claim_id: ClaimId,
    /// Cited URLs that match a held document, in citation order
    pub supporting_urls: Vec<String>,
    /// Distinct logical sources among them
    pub distinct_sources: usize,
}

impl ClaimSupport {
    /// Whether any held document backs the claim
    #[inline]
    #[must_use]
    pub fn is_supported(&self) -> bool {
        !self.supporting_urls.is_empty()
    }
}

/// Verification result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    /// Claims with no supporting document
    pub unsupported: BTreeSet<ClaimId>,
    /// Queries that may find support, at most `min(unsupported, MAX_FOLLOW_UPS)`
    pub follow_up_queries: Vec<String>,
    /// Per-claim detail, in claim order
    pub support: Vec<ClaimSupport>,
}

impl Verification {
    /// Support detail for a claim
    #[must_use]
    pub fn support_for(&self, id: ClaimId) -> Option<&ClaimSupport> {
        self.support.iter().find(|s| s.claim_id == id)
    }

    /// Claims with at least one supporting document
    #[must_use]
    pub fn covered(&self) -> usize {
        self.support.iter().filter(|s| s.is_supported()).count()
    }
}

/// Classify claims and propose follow-up queries
///
/// `executed_queries` are never proposed again.
#[must_use]
pub fn verify(
    claims: &[Claim],
    citations: &[Citation],
    documents: &[Document],
    topic: &str,
    executed_queries: &[String],
) -> Verification {
    let held: HashMap<&str, &str> = documents
        .iter()
        .map(|d| (d.url.as_str(), d.domain.as_str()))
        .collect();
    let by_claim: HashMap<ClaimId, &Citation> = citations.iter().map(|c| (c.claim_id, c)).collect();

    let mut verification = Verification::default();
    for claim in claims {
        let mut supporting_urls = Vec::new();
        let mut sources = HashSet::new();
        for url in by_claim.get(&claim.id).map_or(&[][..], |c| c.urls.as_slice()) {
            let normalized = normalize_url_str(url).unwrap_or_else(|| url.clone());
            if let Some(domain) = held.get(normalized.as_str()) {
                if !supporting_urls.contains(&normalized) {
                    sources.insert(source_key(domain));
                    supporting_urls.push(normalized);
                }
            }
        }
        if supporting_urls.is_empty() {
            verification.unsupported.insert(claim.id);
        }
        verification.support.push(ClaimSupport {
            claim_id: claim.id,
            supporting_urls,
            distinct_sources: sources.len(),
        });
    }

    verification.follow_up_queries = follow_up_queries(
        claims
            .iter()
            .filter(|c| verification.unsupported.contains(&c.id)),
        topic,
        executed_queries,
    );
    tracing::info!(
        claims = claims.len(),
        unsupported = verification.unsupported.len(),
        follow_ups = verification.follow_up_queries.len(),
        "verification finished"
    );
    verification
}

fn follow_up_queries<'a>(
    unsupported: impl Iterator<Item = &'a Claim>,
    topic: &str,
    executed: &[String],
) -> Vec<String> {
    let mut seen: HashSet<String> = executed.iter().map(|q| q.to_lowercase()).collect();
    let topic_words: HashSet<String> = topic
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .collect();

    let mut count = 0;
    let mut queries = Vec::new();
    for claim in unsupported {
        count += 1;
        let terms: Vec<String> = key_terms(&claim.text, FOLLOW_UP_TERMS + topic_words.len())
            .into_iter()
            .filter(|t| !topic_words.contains(t))
            .take(FOLLOW_UP_TERMS)
            .collect();
        if terms.is_empty() {
            continue;
        }
        let query = format!("{topic} {}", terms.join(" "));
        if seen.insert(query.to_lowercase()) {
            queries.push(query);
        }
    }
    queries.truncate(count.min(MAX_FOLLOW_UPS));
    queries
}

/// Most frequent non-stop-words, ties broken by first occurrence
#[must_use]
pub fn key_terms(text: &str, n: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() < 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        let count = counts.entry(word.clone()).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }
    let mut ranked: Vec<(usize, String)> = order.into_iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| counts[b].cmp(&counts[a]).then(ia.cmp(ib)));
    ranked.into_iter().take(n).map(|(_, w)| w).collect()
}
