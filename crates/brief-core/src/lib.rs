//! Brief Core - shared model for the research-brief pipeline
//!
//! Everything the pipeline stages pass between each other lives here:
//! - The data model (search results, documents, claims, citations, reports)
//! - The per-run state record and its metrics
//! - Run constraints and the TOML-backed configuration layer
//! - The error taxonomy and non-fatal failure records
//! - The progress sink shared with concurrent fetch tasks
//! - The retry policy used around every external call
//! - URL normalization and source identity
//!
//! This crate performs no network I/O.

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod progress;
pub mod report;
pub mod retry;
pub mod stage;
pub mod state;
pub mod types;
pub mod urls;

pub use config::{
    validate_topic, BriefConfig, CompletionConfig, Constraints, FetchConfig, QualityConfig,
    SearchConfig,
};
pub use error::{BriefError, Failure, FailureKind, FailureStage, Retryable};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressLog, ProgressSink};
pub use report::{Coverage, Finding, Gap, Report, MAX_LISTED_GAPS};
pub use retry::RetryPolicy;
pub use stage::{allowed_transitions, validate_transition, IllegalTransition, Stage};
pub use state::{RunMetrics, RunState};
pub use types::{
    Citation, Claim, ClaimId, ClaimKind, Document, FetchStatus, RunId, SearchResult,
};
pub use urls::{domain_of, normalize_url, normalize_url_str, source_key};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Brief Core
    pub use crate::{
        BriefConfig, Citation, Claim, ClaimId, ClaimKind, Constraints, Document, Failure,
        FailureKind, FailureStage, ProgressEvent, ProgressSink, Report, RetryPolicy, RunState,
        SearchResult, Stage,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
