//! SYNTHESIZING: documents to claims
//!
//! Documents are split into overlapping chunks and shown to the completion
//! backend in small labelled batches. Drafts cite sources by label (`S2`)
//! or URL; both resolve to the URL of the chunk's document, anything else
//! is dropped.
//!
//! Merging is where remediation happens: a draft that repeats an existing
//! claim adds its URLs to that claim's citation instead of creating a
//! new claim.

use crate::gateway::{Completion, CompletionGateway};
use crate::prompts::{self, SourceExcerpt};
use brief_core::{normalize_url_str, Claim, ClaimKind, Document, Failure, FailureKind, FailureStage, RunState};
use brief_extract::{extract_as, ClaimSet};
use std::collections::HashSet;

/// Chunks per completion call
pub const BATCH_SIZE: usize = 6;

/// Target chunk length in characters
pub const CHUNK_CHARS: usize = 2_000;

/// Characters shared by consecutive chunks of one document
pub const CHUNK_OVERLAP: usize = 200;

/// Claims accepted from one batch
pub const MAX_CLAIMS_PER_BATCH: usize = 12;

/// Word-set Jaccard similarity at which two claims are the same claim
pub const DUPLICATE_THRESHOLD: f64 = 0.8;

/// Claim draft with sources resolved to document URLs
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedDraft {
    /// Claim text
    pub text: String,
    /// Framing
    pub kind: ClaimKind,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Document URLs the draft cites
    pub urls: Vec<String>,
}

/// Slice of a document shown to the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk<'a> {
    /// Document the text belongs to
    pub doc: &'a Document,
    /// Position among the document's chunks
    pub index: usize,
    /// Chunk text
    pub text: &'a str,
}

/// Synthesis result for one round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    /// Drafts in batch order
    pub drafts: Vec<SourcedDraft>,
    /// Non-fatal problems met while synthesizing
    pub failures: Vec<Failure>,
}

/// How drafts were merged into the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// New claims created
    pub added: usize,
    /// Drafts folded into an existing claim
    pub merged: usize,
}

/// Synthesize claims from `documents`
///
/// `Err` only when the completion backend is unreachable for the run.
pub async fn synthesize(
    gateway: &CompletionGateway,
    topic: &str,
    documents: &[Document],
) -> Result<Synthesis, Failure> {
    let mut out = Synthesis::default();
    let chunks: Vec<Chunk<'_>> = documents.iter().flat_map(document_chunks).collect();
    tracing::debug!(docs = documents.len(), chunks = chunks.len(), "documents chunked");

    for (index, batch) in chunks.chunks(BATCH_SIZE).enumerate() {
        let excerpts: Vec<SourceExcerpt<'_>> = batch
            .iter()
            .enumerate()
            .map(|(i, chunk)| SourceExcerpt {
                label: format!("S{}", i + 1),
                title: &chunk.doc.title,
                url: &chunk.doc.url,
                text: chunk.text,
            })
            .collect();
        let request = prompts::claims(topic, &excerpts, MAX_CLAIMS_PER_BATCH);

        let raw = match gateway.complete(&request, FailureStage::Synthesizing).await? {
            Completion::Text(text) => text,
            Completion::Degraded(failure) => {
                out.failures.push(failure);
                continue;
            }
        };

        let extracted = extract_as::<ClaimSet>(&raw);
        if !extracted.ok() {
            out.failures.push(Failure::non_fatal(
                FailureStage::Synthesizing,
                FailureKind::MalformedOutput,
                format!(
                    "claims for batch {} recovered via {:?} ({} usable)",
                    index + 1,
                    extracted.strategy,
                    extracted.value.claims.len()
                ),
            ));
        }

        let before = out.drafts.len();
        for draft in extracted.value.claims.into_iter().take(MAX_CLAIMS_PER_BATCH) {
            let text = draft.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                continue;
            }
            out.drafts.push(SourcedDraft {
                text,
                kind: draft.kind,
                confidence: draft.confidence,
                urls: resolve_sources(&draft.sources, batch),
            });
        }
        tracing::debug!(batch = index + 1, chunks = batch.len(), claims = out.drafts.len() - before, "batch synthesized");
    }
    Ok(out)
}

/// Map source labels and URLs onto the URLs of the batch's documents
#[must_use]
pub fn resolve_sources(sources: &[String], batch: &[Chunk<'_>]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for source in sources {
        let source = source.trim().trim_matches(|c| c == '[' || c == ']');
        let resolved = label_index(source)
            .and_then(|i| batch.get(i))
            .map(|chunk| chunk.doc.url.clone())
            .or_else(|| {
                let normalized = normalize_url_str(source)?;
                batch
                    .iter()
                    .find(|chunk| chunk.doc.url == normalized)
                    .map(|chunk| chunk.doc.url.clone())
            });
        match resolved {
            Some(url) if !urls.contains(&url) => urls.push(url),
            Some(_) => {}
            None => tracing::debug!(source, "dropping citation that matches no document"),
        }
    }
    urls
}

fn label_index(source: &str) -> Option<usize> {
    let digits = source
        .strip_prefix('S')
        .or_else(|| source.strip_prefix('s'))
        .unwrap_or(source);
    let n: usize = digits.parse().ok()?;
    n.checked_sub(1)
}

/// Fold drafts into the run, merging duplicates into existing citations
pub fn merge_into(state: &mut RunState, drafts: Vec<SourcedDraft>) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut known: Vec<(usize, HashSet<String>)> = state
        .claims
        .iter()
        .enumerate()
        .map(|(i, c)| (i, word_set(&c.text)))
        .collect();

    for draft in drafts {
        let words = word_set(&draft.text);
        let duplicate = known
            .iter()
            .find(|(_, existing)| jaccard(existing, &words) >= DUPLICATE_THRESHOLD)
            .map(|(i, _)| state.claims[*i].id);

        if let Some(id) = duplicate {
            if let Some(citation) = state.citation_for_mut(id) {
                citation.merge_urls(draft.urls);
            }
            stats.merged += 1;
            continue;
        }

        let id = state.next_claim_id();
        let claim = Claim::new(id, draft.text, draft.kind, draft.confidence);
        known.push((state.claims.len(), words));
        state.push_claim(claim, draft.urls);
        stats.added += 1;
    }
    stats
}

/// Lowercased alphanumeric words
#[must_use]
pub fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// |A ∩ B| / |A ∪ B|; two empty sets are identical
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / union as f64;
    ratio
}

/// Every chunk of `doc`, in order
#[must_use]
pub fn document_chunks(doc: &Document) -> Vec<Chunk<'_>> {
    split_text(&doc.text, CHUNK_CHARS, CHUNK_OVERLAP)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { doc, index, text })
        .collect()
}

/// Split `text` into chunks of at most `size` characters
///
/// A chunk ends after the last `.` in its second half, else at the last
/// space there, else at `size`. The next chunk starts `overlap` characters
/// before the previous end. Chunks are trimmed and never empty.
#[must_use]
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    let size = size.max(1);
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);
    let total = chars.len();

    let mut out = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = (start + size).min(total);
        if end < total {
            let tail = start + size / 2 + 1..end;
            let last = |wanted: char| tail.clone().rev().find(|&i| chars[i].1 == wanted);
            if let Some(dot) = last('.') {
                end = dot + 1;
            } else if let Some(space) = last(' ') {
                end = space;
            }
        }

        let piece = text[byte_at(start)..byte_at(end)].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        if end >= total {
            break;
        }
        start = (start + 1).max(end.saturating_sub(overlap));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use brief_core::{Constraints, FetchStatus};
    use pretty_assertions::assert_eq;

    fn doc(url: &str) -> Document {
        Document {
            url: url.into(),
            title: "t".into(),
            text: "body".into(),
            domain: "a.example".into(),
            fetch_status: FetchStatus::default(),
        }
    }

    fn draft(text: &str, urls: &[&str]) -> SourcedDraft {
        SourcedDraft {
            text: text.into(),
            kind: ClaimKind::Fact,
            confidence: 0.7,
            urls: urls.iter().map(|u| (*u).to_string()).collect(),
        }
    }

    #[test]
    fn labels_and_urls_resolve_to_batch_documents() {
        let docs = [doc("https://a.example/1"), doc("https://a.example/2")];
        let batch: Vec<Chunk<'_>> = docs.iter().flat_map(document_chunks).collect();
        let sources = vec![
            "S2".to_string(),
            "[S1]".into(),
            "https://A.example/1#frag".into(),
            "S9".into(),
            "https://elsewhere.example/".into(),
        ];
        assert_eq!(
            resolve_sources(&sources, &batch),
            vec!["https://a.example/2".to_string(), "https://a.example/1".into()]
        );
    }

    #[test]
    fn near_duplicates_merge_into_existing_citation() {
        let mut state = RunState::new("topic", Constraints::default());
        let first = merge_into(
            &mut state,
            vec![draft("Solid state cells store more energy per kilogram", &[])],
        );
        assert_eq!(first, MergeStats { added: 1, merged: 0 });

        let second = merge_into(
            &mut state,
            vec![
                draft("solid-state cells store more energy per kilogram", &["https://a.example/1"]),
                draft("Costs are expected to fall by 2030", &[]),
            ],
        );
        assert_eq!(second, MergeStats { added: 1, merged: 1 });
        assert_eq!(state.claims.len(), 2);
        let id = state.claims[0].id;
        assert_eq!(
            state.citation_for(id).map(|c| c.urls.clone()),
            Some(vec!["https://a.example/1".to_string()])
        );
    }

    #[test]
    fn jaccard_bounds() {
        let a = word_set("alpha beta gamma");
        let b = word_set("alpha beta delta");
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
        assert!(jaccard(&a, &HashSet::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("  one short page.  ", 2_000, 200), vec!["one short page."]);
        assert!(split_text("   ", 2_000, 200).is_empty());
    }

    #[test]
    fn chunks_break_at_sentences_and_overlap() {
        let sentence = "Cells cycle well past one thousand times. ";
        let text = sentence.repeat(150);
        let chunks = split_text(&text, 2_000, 200);

        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 2_000);
            assert!(chunk.ends_with('.'));
        }
        let tail: String = chunks[0].chars().rev().take(40).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
        assert!(text.trim_end().ends_with(chunks.last().copied().unwrap_or_default()));
    }

    #[test]
    fn chunks_fall_back_to_spaces_then_hard_cuts() {
        let words = "héllo ".repeat(600);
        for chunk in split_text(&words, 100, 10) {
            assert!(chunk.chars().count() <= 100);
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }

        let solid = "x".repeat(250);
        let chunks = split_text(&solid, 100, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 70);
    }
}
