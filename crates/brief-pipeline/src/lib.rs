//! Brief Pipeline - bounded research runs
//!
//! Sequences the stages of a research brief over pluggable collaborators:
//! - `collaborators`: completion, search and critic capabilities
//! - `providers`: OpenAI-compatible completion and SearxNG search over HTTP
//! - `planner`, `search`, `synthesis`, `verifier`, `writer`: one module per stage
//! - `revision`: the critique-gated rewrite decision
//! - `orchestrator`: the state machine that owns the run
//!
//! # Example
//!
//! ```rust,no_run
//! use brief_core::{BriefConfig, Constraints};
//! use brief_pipeline::Orchestrator;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BriefConfig::default();
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let outcome = orchestrator.run("solid-state batteries", Constraints::default()).await?;
//! println!("{}", outcome.report.to_markdown());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod collaborators;
pub mod critic;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod providers;
pub mod revision;
pub mod search;
pub mod synthesis;
pub mod verifier;
pub mod writer;

pub use collaborators::{CompletionClient, CompletionRequest, Critic, PromptKind, SearchProvider};
pub use critic::CompletionCritic;
pub use error::ProviderError;
pub use gateway::{Completion, CompletionGateway};
pub use orchestrator::{Orchestrator, RunFailure, RunOutcome};
pub use providers::{OpenAiCompatibleClient, SearxngSearch};
pub use revision::{RevisionController, RevisionDecision};
pub use search::SearchOptions;
pub use verifier::{verify, ClaimSupport, Verification};
