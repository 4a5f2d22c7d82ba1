//! Prompt construction
//!
//! Prompts ask for JSON but nothing downstream relies on getting it.

use crate::collaborators::{CompletionRequest, PromptKind};
use std::fmt::Write as _;

const PLAN_SYSTEM: &str = "You plan web research. Reply with JSON only.";
const CLAIMS_SYSTEM: &str =
    "You extract atomic, source-backed claims from web sources. Reply with JSON only.";
const DRAFT_SYSTEM: &str =
    "You write concise research briefs. Use only the claims given and keep their [n] markers.";
const CRITIQUE_SYSTEM: &str = "You review research briefs for accuracy and clarity. Reply with JSON only.";

/// Source excerpt as shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExcerpt<'a> {
    /// Label the model cites (`S1`)
    pub label: String,
    /// Page title
    pub title: &'a str,
    /// Page URL
    pub url: &'a str,
    /// Excerpt text
    pub text: &'a str,
}

/// Research plan request
#[must_use]
pub fn plan(topic: &str, max_queries: usize) -> CompletionRequest {
    let prompt = format!(
        "Topic: {topic}\n\n\
         Break the topic into 3-5 sub-questions and propose at most {max_queries} web search \
         queries that together cover it.\n\n\
         Respond as: {{\"sub_questions\": [\"...\"], \"queries\": [\"...\"]}}"
    );
    CompletionRequest::new(PromptKind::Plan, PLAN_SYSTEM, prompt)
}

/// Claim synthesis request over labelled sources
#[must_use]
pub fn claims(topic: &str, sources: &[SourceExcerpt<'_>], max_claims: usize) -> CompletionRequest {
    let mut prompt = format!("Topic: {topic}\n\nSources:\n");
    for source in sources {
        let _ = write!(
            prompt,
            "\n[{}] {} ({})\n{}\n",
            source.label, source.title, source.url, source.text
        );
    }
    let _ = write!(
        prompt,
        "\nExtract at most {max_claims} distinct claims relevant to the topic. \
         Cite every claim with the labels of the sources that state it.\n\n\
         Respond as: {{\"claims\": [{{\"text\": \"...\", \"kind\": \"fact|estimate|opinion\", \
         \"confidence\": 0.0-1.0, \"sources\": [\"S1\"]}}]}}"
    );
    CompletionRequest::new(PromptKind::Claims, CLAIMS_SYSTEM, prompt)
}

/// Narrative request over cited claims
///
/// `claims` are `(text, markers)` pairs; markers are already numbered.
#[must_use]
pub fn draft(topic: &str, claims: &[(String, String)], revision_notes: &[String]) -> CompletionRequest {
    let mut prompt = format!("Topic: {topic}\n\nClaims:\n");
    for (text, markers) in claims {
        let _ = writeln!(prompt, "- {text} {markers}");
    }
    if !revision_notes.is_empty() {
        prompt.push_str("\nRevise the previous draft to address:\n");
        for note in revision_notes {
            let _ = writeln!(prompt, "- {note}");
        }
    }
    prompt.push_str(
        "\nWrite a short narrative summary (3-6 paragraphs). Keep the [n] markers next to the \
         statements they support; do not invent new markers.\n\n\
         Respond as: {\"title\": \"...\", \"body\": \"...\"}",
    );
    CompletionRequest::new(PromptKind::Draft, DRAFT_SYSTEM, prompt)
}

/// Critique request
#[must_use]
pub fn critique(topic: &str, report_text: &str) -> CompletionRequest {
    let prompt = format!(
        "Topic: {topic}\n\nReport:\n{report_text}\n\n\
         Judge whether the report is ready to publish. List concrete revisions if not.\n\n\
         Respond as: {{\"is_publishable\": true|false, \"revisions_needed\": [\"...\"], \
         \"score\": 0-10}}"
    );
    CompletionRequest::new(PromptKind::Critique, CRITIQUE_SYSTEM, prompt).with_temperature(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brief_extract::ExpectedShape;

    #[test]
    fn requests_carry_their_shape() {
        assert_eq!(plan("t", 8).shape, ExpectedShape::Plan);
        assert_eq!(claims("t", &[], 12).shape, ExpectedShape::Claims);
        assert_eq!(draft("t", &[], &[]).shape, ExpectedShape::Draft);
        assert_eq!(critique("t", "r").shape, ExpectedShape::Critique);
    }

    #[test]
    fn claims_prompt_lists_labels() {
        let sources = [SourceExcerpt {
            label: "S1".into(),
            title: "Title",
            url: "https://a.example/x",
            text: "Body",
        }];
        let request = claims("batteries", &sources, 12);
        assert!(request.prompt.contains("[S1] Title (https://a.example/x)"));
    }

    #[test]
    fn revision_notes_are_included() {
        let request = draft("t", &[("A".into(), "[1]".into())], &["Add dates".into()]);
        assert!(request.prompt.contains("- A [1]"));
        assert!(request.prompt.contains("- Add dates"));
    }
}
