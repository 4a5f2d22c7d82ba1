//! Pipeline orchestrator
//!
//! Drives one run through its stages:
//!
//! ```text
//! PLANNING -> RETRIEVING -> SYNTHESIZING -> VERIFYING -+-> RETRIEVING (next round)
//!                                                      +-> WRITING -> CRITIQUING -+-> WRITING (once) -> DONE
//!                                                                                 +-> DONE
//! ```
//!
//! # Termination
//! - At most `max_rounds` retrieval rounds, whatever the verifier says
//! - At most one critique per run and at most `max_revisions` extra writes
//! - The wall-clock budget is checked on entry to every stage; once it is
//!   spent the run goes straight to WRITING (or DONE from CRITIQUING)
//!
//! # Failures
//! Only invalid input and a completion backend that never answers stop a
//! run. Everything else is recorded on the run state and the stage
//! carries on with what it has.

use crate::collaborators::{CompletionClient, Critic, SearchProvider};
use crate::critic::CompletionCritic;
use crate::error::ProviderError;
use crate::gateway::CompletionGateway;
use crate::planner;
use crate::providers::{OpenAiCompatibleClient, SearxngSearch};
use crate::revision::RevisionController;
use crate::search::{self, SearchOptions};
use crate::synthesis;
use crate::verifier::{self, Verification};
use crate::writer::{self, WriterInput};
use brief_core::{
    validate_topic, validate_transition, BriefConfig, Constraints, Document, Failure, FailureKind,
    FailureStage, NullSink, ProgressEvent, ProgressSink, Report, RetryPolicy, RunState, Stage,
};
use brief_retrieval::{
    DomainQuota, FetchOptions, HtmlTextExtractor, HttpFetcher, HttpRobotsPolicy, QualityGate,
    Retriever,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Percent reported when planning starts
const PLANNING_PERCENT: u8 = 5;
/// Retrieval rounds share this percent range
const ROUNDS_PERCENT: (u8, u8) = (10, 80);
const WRITING_PERCENT: u8 = 80;
const CRITIQUING_PERCENT: u8 = 90;
const REVISING_PERCENT: u8 = 95;
const DONE_PERCENT: u8 = 100;

/// A finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final report
    pub report: Report,
    /// Run state at DONE
    pub state: RunState,
}

/// A run that ended in FAILED
#[derive(Debug, Clone, thiserror::Error)]
#[error("{failure}")]
pub struct RunFailure {
    /// The fatal failure
    pub failure: Failure,
    /// Run state at the point of failure; absent when input was rejected
    pub state: Option<Box<RunState>>,
}

impl RunFailure {
    /// Rejected before the run started
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        self.failure.kind == FailureKind::InvalidInput
    }
}

/// Work that stays between stages of one run
struct RunContext {
    gateway: CompletionGateway,
    deadline: Instant,
    budget_recorded: bool,
    round_documents: Vec<Document>,
    verification: Verification,
    revision_notes: Vec<String>,
    report: Option<Report>,
}

/// Drives research runs
#[derive(Clone)]
pub struct Orchestrator {
    completion: Arc<dyn CompletionClient>,
    search: Arc<dyn SearchProvider>,
    retriever: Retriever,
    critic: Option<Arc<dyn Critic>>,
    sink: Arc<dyn ProgressSink>,
    retry: RetryPolicy,
    completion_timeout: Duration,
    search_options: SearchOptions,
    revisions: RevisionController,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retriever", &self.retriever)
            .field("critic", &self.critic.is_some())
            .field("retry", &self.retry)
            .field("completion_timeout", &self.completion_timeout)
            .field("search_options", &self.search_options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator over the given collaborators, without a critic
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        search: Arc<dyn SearchProvider>,
        retriever: Retriever,
    ) -> Self {
        Self {
            completion,
            search,
            retriever,
            critic: None,
            sink: Arc::new(NullSink),
            retry: RetryPolicy::default(),
            completion_timeout: Duration::from_secs(90),
            search_options: SearchOptions::default(),
            revisions: RevisionController,
        }
    }

    /// Orchestrator over the HTTP providers named in `config`
    ///
    /// The critic is the completion backend itself.
    pub fn from_config(config: &BriefConfig) -> Result<Self, ProviderError> {
        let completion: Arc<dyn CompletionClient> =
            Arc::new(OpenAiCompatibleClient::new(&config.completion)?);
        let search: Arc<dyn SearchProvider> = Arc::new(SearxngSearch::new(&config.search)?);

        let http = HttpFetcher::client(&config.fetch).map_err(|e| ProviderError::Config(e.to_string()))?;
        let retriever = Retriever::new(
            Arc::new(HttpRobotsPolicy::new(http.clone(), config.fetch.robots_agent.clone())),
            Arc::new(HttpFetcher::with_client(http, config.fetch.max_body_bytes)),
            Arc::new(HtmlTextExtractor::new(config.fetch.max_text_chars)),
        )
        .with_quality_gate(QualityGate::from_config(&config.quality));

        Ok(Self::new(Arc::clone(&completion), search, retriever)
            .with_critic(Arc::new(CompletionCritic::new(completion)))
            .with_retry(config.retry.clone())
            .with_completion_timeout(config.completion.timeout)
            .with_search_options(SearchOptions {
                results_per_query: config.constraints.results_per_query,
                max_concurrent: config.search.max_concurrent_queries,
                timeout: config.search.timeout,
                retry: config.retry.clone(),
            }))
    }

    /// With a critic for the optional revision pass
    #[must_use]
    pub fn with_critic(mut self, critic: Arc<dyn Critic>) -> Self {
        self.critic = Some(critic);
        self
    }

    /// Without a critic; reports are never revised
    #[must_use]
    pub fn without_critic(mut self) -> Self {
        self.critic = None;
        self
    }

    /// With a progress sink, shared with fetch tasks
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.retriever = self.retriever.with_sink(Arc::clone(&sink));
        self.sink = sink;
        self
    }

    /// With retry policy for completion calls
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With per-call completion deadline
    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// With search limits
    #[must_use]
    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    /// Research `topic` within `constraints`
    ///
    /// # Errors
    /// `RunFailure` for an empty topic or invalid constraints (before any
    /// work), and when the completion backend never answers.
    pub async fn run(&self, topic: &str, constraints: Constraints) -> Result<RunOutcome, RunFailure> {
        let topic = validate_topic(topic).map_err(reject)?;
        constraints.validate().map_err(reject)?;

        let mut state = RunState::new(topic, constraints);
        let mut ctx = self.context(&state);
        tracing::info!(run = %state.run_id, topic = %state.topic, "research run started");
        self.emit(&state, PLANNING_PERCENT, None);

        match self.drive(&mut state, &mut ctx).await {
            Ok(report) => {
                self.finish_metrics(&mut state, &ctx);
                tracing::info!(
                    run = %state.run_id,
                    rounds = state.metrics.rounds,
                    claims = state.claims.len(),
                    covered = report.coverage.claims_covered,
                    failures = state.partial_failures.len(),
                    "research run finished"
                );
                metrics::counter!("brief_runs_total", "outcome" => "done").increment(1);
                Ok(RunOutcome { report, state })
            }
            Err(failure) => {
                self.finish_metrics(&mut state, &ctx);
                tracing::error!(run = %state.run_id, "research run failed: {failure}");
                state.stage = Stage::Failed;
                state.partial_failures.push(failure.clone());
                self.emit(&state, DONE_PERCENT, Some(failure.detail.clone()));
                metrics::counter!("brief_runs_total", "outcome" => "failed").increment(1);
                Err(RunFailure {
                    failure,
                    state: Some(Box::new(state)),
                })
            }
        }
    }

    fn context(&self, state: &RunState) -> RunContext {
        RunContext {
            gateway: CompletionGateway::new(
                Arc::clone(&self.completion),
                self.retry.clone(),
                self.completion_timeout,
            ),
            deadline: Instant::now() + state.constraints.wall_clock_budget,
            budget_recorded: false,
            round_documents: Vec::new(),
            verification: Verification::default(),
            revision_notes: Vec::new(),
            report: None,
        }
    }

    async fn drive(&self, state: &mut RunState, ctx: &mut RunContext) -> Result<Report, Failure> {
        while !state.stage.is_terminal() {
            let stage = state.stage;
            let next = match stage {
                stage if stage != Stage::Writing && self.budget_spent(state, ctx) => {
                    if stage == Stage::Critiquing {
                        Stage::Done
                    } else {
                        Stage::Writing
                    }
                }
                Stage::Planning => self.planning(state, ctx).await?,
                Stage::Retrieving => self.retrieving(state, ctx).await,
                Stage::Synthesizing => self.synthesizing(state, ctx).await?,
                Stage::Verifying => self.verifying(state, ctx),
                Stage::Writing => self.writing(state, ctx).await?,
                Stage::Critiquing => self.critiquing(state, ctx).await,
                Stage::Done | Stage::Failed => break,
            };
            self.advance(state, next);
        }
        match (state.stage, ctx.report.take()) {
            (Stage::Done, Some(report)) => Ok(report),
            (stage, _) => Err(Failure::fatal(
                stage.failure_stage(),
                FailureKind::Internal,
                format!("run stopped at {stage} without a report"),
            )),
        }
    }

    fn budget_spent(&self, state: &mut RunState, ctx: &mut RunContext) -> bool {
        if Instant::now() < ctx.deadline {
            return false;
        }
        if !ctx.budget_recorded {
            ctx.budget_recorded = true;
            tracing::warn!(stage = %state.stage, round = state.round, "wall-clock budget spent");
            state.record(Failure::non_fatal(
                FailureStage::Budget,
                FailureKind::BudgetExceeded,
                format!(
                    "wall-clock budget of {}s spent at {}",
                    state.constraints.wall_clock_budget.as_secs_f64(),
                    state.stage
                ),
            ));
        }
        true
    }

    fn advance(&self, state: &mut RunState, next: Stage) {
        if let Err(err) = validate_transition(state.stage, next) {
            tracing::error!("{err}");
            debug_assert!(false, "{err}");
        }
        tracing::debug!(from = %state.stage, to = %next, round = state.round, "stage transition");
        state.stage = next;
        let percent = match next {
            Stage::Planning => PLANNING_PERCENT,
            Stage::Retrieving => self.round_range(state).0,
            Stage::Synthesizing => self.round_point(state, 6),
            Stage::Verifying => self.round_point(state, 9),
            Stage::Writing if state.revision_count > 0 => REVISING_PERCENT,
            Stage::Writing => WRITING_PERCENT,
            Stage::Critiquing => CRITIQUING_PERCENT,
            Stage::Done | Stage::Failed => DONE_PERCENT,
        };
        self.emit(state, percent, None);
    }

    fn emit(&self, state: &RunState, percent: u8, detail: Option<String>) {
        let mut event = ProgressEvent::new(state.stage, state.round, percent);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.sink.emit(event);
    }

    /// Percent range of the current round
    fn round_range(&self, state: &RunState) -> (u8, u8) {
        let (start, end) = ROUNDS_PERCENT;
        let rounds = state.constraints.max_rounds.max(1);
        let span = u32::from(end - start);
        let at = |round: u32| {
            let offset = span * round.min(rounds) / rounds;
            start + u8::try_from(offset).unwrap_or(end - start)
        };
        (at(state.round), at(state.round + 1))
    }

    /// `tenths` of the way through the current round
    fn round_point(&self, state: &RunState, tenths: u8) -> u8 {
        let (lo, hi) = self.round_range(state);
        between(lo, hi, tenths)
    }

    async fn planning(&self, state: &mut RunState, ctx: &mut RunContext) -> Result<Stage, Failure> {
        let plan = planner::plan(&ctx.gateway, &state.topic).await?;
        for failure in plan.failures {
            state.record(failure);
        }
        state.add_queries(plan.queries);
        Ok(Stage::Retrieving)
    }

    async fn retrieving(&self, state: &mut RunState, ctx: &mut RunContext) -> Stage {
        state.metrics.rounds = state.round + 1;

        let queries = state.pending_queries().to_vec();
        let searched = search::run_queries(self.search.as_ref(), &queries, &self.search_options).await;
        state.mark_queries_executed();
        state.metrics.queries_executed += searched.executed;
        for failure in searched.failures {
            state.record(failure);
        }
        let filtered = search::filter_domains(
            searched.results,
            &state.constraints.include_domains,
            &state.constraints.exclude_domains,
        );
        let added = state.merge_search_results(filtered);
        tracing::info!(round = state.round, queries = queries.len(), new_results = added.len(), "search finished");

        let candidates: Vec<String> = state
            .search_results
            .iter()
            .filter(|r| !state.attempted_urls.contains(&r.url))
            .map(|r| r.url.clone())
            .collect();
        let (lo, hi) = self.round_range(state);
        let options = FetchOptions::from_constraints(&state.constraints)
            .with_round(state.round)
            .with_progress_range(lo, between(lo, hi, 6));
        let quota = DomainQuota::with_held(state.constraints.per_domain_cap, &state.documents);
        let batch = self
            .retriever
            .fetch_all_with_quota(&candidates, &options, quota)
            .await;

        state.metrics.urls_attempted += batch.attempted.len();
        state.metrics.urls_fetched += batch.documents.len();
        state.metrics.urls_failed += batch.failures.len();
        state.attempted_urls.extend(batch.attempted);
        for failure in batch.failures {
            state.record(failure);
        }
        ctx.round_documents = batch.documents.clone();
        state.add_documents(batch.documents);
        Stage::Synthesizing
    }

    async fn synthesizing(&self, state: &mut RunState, ctx: &mut RunContext) -> Result<Stage, Failure> {
        let documents = std::mem::take(&mut ctx.round_documents);
        if documents.is_empty() {
            tracing::info!(round = state.round, "no new documents to synthesize");
            return Ok(Stage::Verifying);
        }
        let synthesis = synthesis::synthesize(&ctx.gateway, &state.topic, &documents).await?;
        for failure in synthesis.failures {
            state.record(failure);
        }
        let stats = synthesis::merge_into(state, synthesis.drafts);
        tracing::info!(round = state.round, added = stats.added, merged = stats.merged, "claims merged");
        Ok(Stage::Verifying)
    }

    fn verifying(&self, state: &mut RunState, ctx: &mut RunContext) -> Stage {
        let executed = &state.queries[..state.executed_queries.min(state.queries.len())];
        let verification = verifier::verify(
            &state.claims,
            &state.citations,
            &state.documents,
            &state.topic,
            executed,
        );
        state.unsupported = verification.unsupported.clone();
        let follow_ups = verification.follow_up_queries.clone();
        ctx.verification = verification;

        if state.unsupported.is_empty() || state.round + 1 >= state.constraints.max_rounds {
            return Stage::Writing;
        }
        let added = state.add_queries(follow_ups);
        if added == 0 {
            tracing::info!(round = state.round, "no new follow-up queries; writing");
            return Stage::Writing;
        }
        state.round += 1;
        tracing::info!(round = state.round, follow_ups = added, "starting remediation round");
        Stage::Retrieving
    }

    async fn writing(&self, state: &mut RunState, ctx: &mut RunContext) -> Result<Stage, Failure> {
        ctx.verification = verifier::verify(
            &state.claims,
            &state.citations,
            &state.documents,
            &state.topic,
            &[],
        );
        state.unsupported = ctx.verification.unsupported.clone();
        if state.revision_count == 0 && !state.unsupported.is_empty() {
            state.record(Failure::non_fatal(
                FailureStage::Writing,
                FailureKind::UnresolvedClaim,
                format!("{} claims reported as known gaps", state.unsupported.len()),
            ));
        }

        let input = WriterInput::from_state(state, &ctx.verification, std::mem::take(&mut ctx.revision_notes));
        let written = writer::write(&ctx.gateway, input).await?;
        for failure in written.failures {
            state.record(failure);
        }
        state.metrics.write_passes += 1;
        state.report = Some(written.report.clone());
        ctx.report = Some(written.report);

        let critique = self.critic.is_some()
            && state.revision_count == 0
            && state.revision_count < state.constraints.max_revisions
            && !ctx.budget_recorded;
        Ok(if critique { Stage::Critiquing } else { Stage::Done })
    }

    async fn critiquing(&self, state: &mut RunState, ctx: &mut RunContext) -> Stage {
        let (Some(critic), Some(report)) = (&self.critic, &ctx.report) else {
            return Stage::Done;
        };
        let text = report.to_markdown();
        let topic = state.topic.clone();
        let timeout = self.completion_timeout;
        let raw = self
            .retry
            .run("critique", |_attempt| {
                let critic = Arc::clone(critic);
                let topic = topic.clone();
                let text = text.clone();
                async move {
                    match tokio::time::timeout(timeout, critic.critique(&topic, &text)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout {
                            duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        }),
                    }
                }
            })
            .await;

        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                state.record(Failure::non_fatal(
                    FailureStage::Critiquing,
                    err.kind(),
                    format!("critique failed: {err}"),
                ));
                return Stage::Done;
            }
        };

        let decision = self.revisions.should_revise(report, &raw);
        if !decision.critique_ok {
            state.record(Failure::non_fatal(
                FailureStage::Critiquing,
                FailureKind::MalformedOutput,
                "critique could not be read; keeping report",
            ));
        }
        if decision.revise {
            state.revision_count += 1;
            ctx.revision_notes = decision.instructions;
            return Stage::Writing;
        }
        Stage::Done
    }

    fn finish_metrics(&self, state: &mut RunState, ctx: &RunContext) {
        state.metrics.completion_calls = ctx.gateway.calls();
        state.metrics.completion_successes = ctx.gateway.successes();
        state.metrics.elapsed_ms = state.elapsed_ms();
    }
}

fn between(lo: u8, hi: u8, tenths: u8) -> u8 {
    let step = u16::from(hi.saturating_sub(lo)) * u16::from(tenths.min(10)) / 10;
    lo.saturating_add(u8::try_from(step).unwrap_or(u8::MAX))
}

fn reject(err: brief_core::BriefError) -> RunFailure {
    tracing::error!("rejecting run: {err}");
    RunFailure {
        failure: Failure::fatal(FailureStage::Input, FailureKind::InvalidInput, err.to_string()),
        state: None,
    }
}
