//! Pipeline stage machine
//!
//! Legal moves only. Budget trips are modelled as ordinary transitions
//! into `Writing` (or `Done` once a report exists).

use crate::error::FailureStage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Turning the topic into sub-questions and queries
    Planning,
    /// Searching and fetching documents for the round
    Retrieving,
    /// Extracting claims from the round's documents
    Synthesizing,
    /// Checking claims against held documents
    Verifying,
    /// Assembling the report
    Writing,
    /// Asking the critic whether to revise
    Critiquing,
    /// Report finalized
    Done,
    /// Aborted by a fatal failure
    Failed,
}

impl Stage {
    /// No further transitions possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Failure bucket for errors raised while in this stage
    #[must_use]
    pub fn failure_stage(self) -> FailureStage {
        match self {
            Stage::Planning => FailureStage::Planning,
            Stage::Retrieving => FailureStage::Retrieving,
            Stage::Synthesizing => FailureStage::Synthesizing,
            Stage::Verifying => FailureStage::Verifying,
            Stage::Writing | Stage::Done | Stage::Failed => FailureStage::Writing,
            Stage::Critiquing => FailureStage::Critiquing,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Planning => "PLANNING",
            Stage::Retrieving => "RETRIEVING",
            Stage::Synthesizing => "SYNTHESIZING",
            Stage::Verifying => "VERIFYING",
            Stage::Writing => "WRITING",
            Stage::Critiquing => "CRITIQUING",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Illegal stage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal stage transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Current stage
    pub from: Stage,
    /// Requested stage
    pub to: Stage,
}

/// Validates a stage transition.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// Stages reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: Stage) -> &'static [Stage] {
    use Stage::*;
    match from {
        Planning => &[Retrieving, Writing, Failed],
        Retrieving => &[Synthesizing, Writing, Failed],
        Synthesizing => &[Verifying, Writing, Failed],
        Verifying => &[Retrieving, Writing, Failed],
        Writing => &[Critiquing, Done, Failed],
        Critiquing => &[Writing, Done, Failed],
        Done | Failed => &[],
    }
}
