//! Revision gate
//!
//! Turns a raw critique into a yes/no rewrite decision. Malformed
//! critiques never block a report: when the verdict cannot be read the
//! answer is "no revision".

use brief_core::Report;
use brief_extract::{extract_as, Critique};

/// Instructions passed to a rewrite
pub const MAX_INSTRUCTIONS: usize = 5;

/// Outcome of `should_revise`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionDecision {
    /// Rewrite the report once
    pub revise: bool,
    /// What the rewrite should address
    pub instructions: Vec<String>,
    /// The critique was read faithfully
    pub critique_ok: bool,
}

/// Decides whether a report gets its one rewrite
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionController;

impl RevisionController {
    /// Decide from a raw critique
    ///
    /// Revises only when the critique parsed cleanly, judged the report
    /// unpublishable and named at least one concrete change. A report
    /// that is already a revision is never revised again.
    #[must_use]
    pub fn should_revise(&self, report: &Report, critique: &str) -> RevisionDecision {
        let extracted = extract_as::<Critique>(critique);
        let critique_ok = extracted.ok();
        if !critique_ok {
            tracing::warn!(strategy = ?extracted.strategy, "critique unreadable; keeping report as is");
            return RevisionDecision {
                critique_ok,
                ..RevisionDecision::default()
            };
        }
        if report.revision > 0 {
            return RevisionDecision {
                critique_ok,
                ..RevisionDecision::default()
            };
        }

        let critique = extracted.value;
        let mut instructions: Vec<String> = Vec::new();
        for item in critique.revisions_needed {
            let item = item.split_whitespace().collect::<Vec<_>>().join(" ");
            if !item.is_empty() && !instructions.contains(&item) {
                instructions.push(item);
            }
        }
        instructions.truncate(MAX_INSTRUCTIONS);

        let revise = !critique.is_publishable && !instructions.is_empty();
        tracing::info!(
            publishable = critique.is_publishable,
            score = ?critique.score,
            instructions = instructions.len(),
            revise,
            "critique evaluated"
        );
        RevisionDecision {
            revise,
            instructions,
            critique_ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brief_core::Coverage;
    use chrono::Utc;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn report(revision: u32) -> Report {
        Report {
            title: "t".into(),
            body_text: "b".into(),
            references: IndexMap::new(),
            coverage: Coverage::default(),
            findings: Vec::new(),
            gaps: Vec::new(),
            omitted_gaps: 0,
            revision,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unpublishable_with_instructions_revises() {
        let critique = r#"{"is_publishable": false, "revisions_needed": ["Add dates", "Add dates", "a", "b", "c", "d", "e"]}"#;
        let decision = RevisionController.should_revise(&report(0), critique);
        assert!(decision.revise);
        assert_eq!(decision.instructions, vec!["Add dates", "a", "b", "c", "d"]);
    }

    #[test]
    fn publishable_is_left_alone() {
        let decision =
            RevisionController.should_revise(&report(0), r#"{"is_publishable": true, "revisions_needed": ["x"]}"#);
        assert!(!decision.revise);
    }

    #[test]
    fn malformed_critique_fails_open() {
        let decision = RevisionController.should_revise(&report(0), r#"{"is_publishable": fal"#);
        assert_eq!(decision, RevisionDecision::default());
    }

    #[test]
    fn unpublishable_without_instructions_does_not_revise() {
        let decision = RevisionController.should_revise(&report(0), r#"{"is_publishable": false}"#);
        assert!(!decision.revise);
        assert!(decision.critique_ok);
    }

    #[test]
    fn revisions_are_not_revised() {
        let decision = RevisionController.should_revise(
            &report(1),
            r#"{"is_publishable": false, "revisions_needed": ["again"]}"#,
        );
        assert!(!decision.revise);
    }
}
