//! End-to-end runs over scripted collaborators

use brief_core::{Constraints, FailureKind, FailureStage, RetryPolicy, RunState, Stage};
use brief_pipeline::{Orchestrator, PromptKind, SearchOptions};
use brief_retrieval::{AllowAll, HtmlTextExtractor, Retriever};
use brief_test_utils::{article_html, RecordingSink, ScriptedCompletion, ScriptedCritic, StaticFetcher, StaticSearch};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "solid-state batteries";
const PLAN_QUERY: &str = "solid-state battery commercialization";

const A: &str = "https://alpha.example/report";
const B: &str = "https://beta.example/analysis";
const C: &str = "https://gamma.example/news";
const D: &str = "https://delta.example/costs";

fn plan_reply() -> String {
    format!(r#"{{"sub_questions":["When will cells ship?"],"queries":["{PLAN_QUERY}"]}}"#)
}

fn draft_reply() -> &'static str {
    r#"{"title":"Solid-State Batteries: Where Things Stand","body":"Prototype cells are moving to pilot lines [1]."}"#
}

fn fetcher_for(urls: &[&str]) -> StaticFetcher {
    urls.iter().enumerate().fold(StaticFetcher::new(), |f, (i, url)| {
        f.page(url, article_html(&format!("Source {}", i + 1), 160))
    })
}

fn orchestrator(completion: Arc<ScriptedCompletion>, search: StaticSearch, fetcher: StaticFetcher) -> Orchestrator {
    let retriever = Retriever::new(
        Arc::new(AllowAll),
        Arc::new(fetcher),
        Arc::new(HtmlTextExtractor::default()),
    );
    Orchestrator::new(completion, Arc::new(search), retriever)
        .with_retry(RetryPolicy::none())
        .with_search_options(SearchOptions {
            retry: RetryPolicy::none(),
            ..SearchOptions::default()
        })
}

/// Every finding cites known references and every reference is a held document
fn assert_citations_resolve(state: &RunState) {
    let report = state.report.as_ref().expect("report");
    for finding in &report.findings {
        assert!(!finding.markers.is_empty(), "finding without markers: {}", finding.text);
        for marker in &finding.markers {
            let url = report.references.get(marker).expect("marker has a reference");
            assert!(
                state.documents.iter().any(|d| &d.url == url),
                "reference {url} is not a held document"
            );
        }
    }
    assert_eq!(
        report.coverage.claims_covered + report.gaps.len() + report.omitted_gaps,
        report.coverage.claims_total
    );
}

#[tokio::test]
async fn fully_cited_single_round() {
    let claims = r#"{"claims":[
        {"text":"Sulfide electrolytes reached pilot production in 2024","kind":"fact","confidence":0.8,"sources":["S1"]},
        {"text":"Energy density gains of 40 percent are projected","kind":"estimate","confidence":0.6,"sources":["S2","S3"]},
        {"text":"Analysts expect vehicle adoption after 2028","kind":"opinion","confidence":0.5,"sources":["https://gamma.example/news"]}
    ]}"#;
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, claims)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let search = StaticSearch::new().with_default(&[A, B, C]);

    let outcome = orchestrator(Arc::clone(&completion), search, fetcher_for(&[A, B, C]))
        .run(TOPIC, Constraints::default().with_max_rounds(1))
        .await
        .unwrap();

    let report = &outcome.report;
    assert_eq!(outcome.state.stage, Stage::Done);
    assert_eq!(outcome.state.documents.len(), 3);
    assert_eq!(report.coverage.claims_total, 3);
    assert_eq!(report.coverage.claims_covered, 3);
    assert!(report.gaps.is_empty());
    assert_eq!(report.references.len(), 3);
    assert_eq!(report.title, "Solid-State Batteries: Where Things Stand");
    assert!(report.body_text.contains("100%"));
    assert_eq!(outcome.state.metrics.rounds, 1);
    assert_eq!(outcome.state.metrics.write_passes, 1);
    assert!(!outcome
        .state
        .partial_failures
        .iter()
        .any(|f| f.kind == FailureKind::UnresolvedClaim));
    assert_eq!(completion.calls_of(PromptKind::Critique), 0);
    assert_citations_resolve(&outcome.state);
}

#[tokio::test]
async fn truncated_claims_degrade_without_failing() {
    let truncated = r#"{"claims":[{"text":"Solid electrolytes suppress dendrite growth","sources":["S1"]},{"text":"Pilot lines are"#;
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, truncated)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let search = StaticSearch::new().with_default(&[A]);

    let outcome = orchestrator(completion, search, fetcher_for(&[A]))
        .run(TOPIC, Constraints::default().with_max_rounds(1))
        .await
        .unwrap();

    assert_eq!(outcome.state.stage, Stage::Done);
    assert!(!outcome.state.claims.is_empty());
    assert!(outcome
        .state
        .partial_failures
        .iter()
        .any(|f| f.stage == FailureStage::Synthesizing && f.kind == FailureKind::MalformedOutput && !f.fatal));
    assert_citations_resolve(&outcome.state);
}

#[tokio::test]
async fn uncited_claim_triggers_a_remediation_round() {
    let first = r#"{"claims":[
        {"text":"Sulfide electrolytes reached pilot production","sources":["S1"]},
        {"text":"Manufacturing costs remain far above lithium-ion cells","sources":[]}
    ]}"#;
    let second = r#"{"claims":[
        {"text":"Manufacturing costs remain far above lithium-ion cells","sources":["S1"]}
    ]}"#;
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .then(PromptKind::Claims, first)
            .then(PromptKind::Claims, second)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let search = StaticSearch::new().with_results(PLAN_QUERY, &[A]).with_default(&[D]);

    let outcome = orchestrator(Arc::clone(&completion), search, fetcher_for(&[A, D]))
        .run(TOPIC, Constraints::default().with_max_rounds(2))
        .await
        .unwrap();

    let state = &outcome.state;
    assert_eq!(state.metrics.rounds, 2);
    assert!(state.queries.len() > 1);
    assert_eq!(state.documents.len(), 2);
    assert_eq!(state.claims.len(), 2);
    assert_eq!(completion.calls_of(PromptKind::Claims), 2);
    assert!(outcome.report.gaps.is_empty());
    assert_eq!(outcome.report.coverage.claims_covered, 2);
    assert_citations_resolve(state);
}

#[tokio::test]
async fn unsupported_claims_become_known_gaps() {
    let claims = r#"{"claims":[
        {"text":"Sulfide electrolytes reached pilot production","sources":["S1"]},
        {"text":"Recycling yields exceed ninety percent","sources":["https://unknown.example/x"]}
    ]}"#;
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, claims)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let search = StaticSearch::new().with_results(PLAN_QUERY, &[A]).with_default(&[D]);

    let outcome = orchestrator(Arc::clone(&completion), search, fetcher_for(&[A, D]))
        .run(TOPIC, Constraints::default().with_max_rounds(2))
        .await
        .unwrap();

    let state = &outcome.state;
    assert_eq!(state.stage, Stage::Done);
    assert_eq!(state.metrics.rounds, 2);
    assert!(state.queries.len() > 1);
    assert_eq!(state.documents.len(), 2);
    assert!(state.documents.iter().any(|d| d.url == D));
    assert_eq!(completion.calls_of(PromptKind::Claims), 2);

    let report = &outcome.report;
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].text, "Recycling yields exceed ninety percent");
    assert!(report.body_text.contains("## Known Gaps"));
    let unresolved = state
        .partial_failures
        .iter()
        .filter(|f| f.kind == FailureKind::UnresolvedClaim)
        .count();
    assert_eq!(unresolved, 1);
    assert_citations_resolve(state);
}

#[tokio::test]
async fn domain_cap_holds_across_the_run() {
    let same: Vec<String> = (1..=5).map(|i| format!("https://same.example/p{i}")).collect();
    let refs: Vec<&str> = same.iter().map(String::as_str).collect();
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, r#"[{"text":"Cells are shipping","sources":["S1"]}]"#)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let search = StaticSearch::new().with_default(&refs);

    let outcome = orchestrator(completion, search, fetcher_for(&refs))
        .run(TOPIC, Constraints::default().with_max_rounds(1).with_per_domain_cap(2))
        .await
        .unwrap();

    assert_eq!(outcome.state.documents.len(), 2);
    assert_eq!(outcome.state.metrics.urls_attempted, 2);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_work() {
    let completion = Arc::new(ScriptedCompletion::new());
    let orch = orchestrator(Arc::clone(&completion), StaticSearch::new(), StaticFetcher::new());

    let blank = orch.run("  \n ", Constraints::default()).await.unwrap_err();
    assert!(blank.is_invalid_input());
    assert!(blank.state.is_none());

    let zero_rounds = orch
        .run(TOPIC, Constraints::default().with_max_rounds(0))
        .await
        .unwrap_err();
    assert!(zero_rounds.is_invalid_input());
    assert!(completion.calls().is_empty());
}

#[tokio::test]
async fn unreachable_backend_fails_the_run() {
    let completion = Arc::new(ScriptedCompletion::unreachable());
    let err = orchestrator(completion, StaticSearch::new().with_default(&[A]), fetcher_for(&[A]))
        .run(TOPIC, Constraints::default())
        .await
        .unwrap_err();

    assert_eq!(err.failure.kind, FailureKind::ProviderUnavailable);
    assert!(err.failure.fatal);
    let state = err.state.expect("state at failure");
    assert_eq!(state.stage, Stage::Failed);
    assert!(state.report.is_none());
}

#[tokio::test(start_paused = true)]
async fn spent_budget_skips_to_writing() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .with_delay(Duration::from_secs(30)),
    );
    let critic = Arc::new(ScriptedCritic::new(r#"{"is_publishable":false,"revisions_needed":["More"]}"#));
    let orch = orchestrator(completion, StaticSearch::new().with_default(&[A]), fetcher_for(&[A]))
        .with_critic(critic.clone());

    let outcome = orch
        .run(
            TOPIC,
            Constraints::default().with_wall_clock_budget(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    let state = &outcome.state;
    assert_eq!(state.stage, Stage::Done);
    assert_eq!(state.metrics.rounds, 0);
    assert_eq!(state.metrics.write_passes, 1);
    assert_eq!(critic.calls(), 0);
    let budget: Vec<_> = state
        .partial_failures
        .iter()
        .filter(|f| f.kind == FailureKind::BudgetExceeded)
        .collect();
    assert_eq!(budget.len(), 1);
    assert_eq!(budget[0].stage, FailureStage::Budget);
}

#[tokio::test]
async fn critique_triggers_one_revision() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, r#"[{"text":"Cells are shipping to partners","sources":["S1"]}]"#)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let critic = Arc::new(ScriptedCritic::new(
        r#"{"is_publishable":false,"overall_score":5,"revisions_needed":["Quantify the timeline","Quantify the timeline"]}"#,
    ));
    let orch = orchestrator(Arc::clone(&completion), StaticSearch::new().with_default(&[A]), fetcher_for(&[A]))
        .with_critic(critic.clone());

    let outcome = orch
        .run(TOPIC, Constraints::default().with_max_rounds(1).with_max_revisions(3))
        .await
        .unwrap();

    assert_eq!(critic.calls(), 1);
    assert_eq!(outcome.state.revision_count, 1);
    assert_eq!(outcome.state.metrics.write_passes, 2);
    assert_eq!(outcome.report.revision, 1);
    assert_eq!(completion.calls_of(PromptKind::Draft), 2);
    let revised = completion
        .calls()
        .into_iter()
        .filter(|r| r.kind == PromptKind::Draft)
        .last()
        .expect("revision draft");
    assert!(revised.prompt.contains("Quantify the timeline"));
}

#[tokio::test]
async fn no_revisions_allowed_means_no_critique() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, r#"[{"text":"Cells are shipping","sources":["S1"]}]"#)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let critic = Arc::new(ScriptedCritic::new(r#"{"is_publishable":false,"revisions_needed":["x"]}"#));
    let outcome = orchestrator(completion, StaticSearch::new().with_default(&[A]), fetcher_for(&[A]))
        .with_critic(critic.clone())
        .run(TOPIC, Constraints::default().with_max_rounds(1).with_max_revisions(0))
        .await
        .unwrap();

    assert_eq!(critic.calls(), 0);
    assert_eq!(outcome.state.metrics.write_passes, 1);
}

#[tokio::test]
async fn runs_stay_within_round_and_write_bounds() {
    for (rounds, revisions) in [(1, 0), (2, 1), (3, 2)] {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .respond(PromptKind::Plan, plan_reply())
                .respond(PromptKind::Claims, r#"[{"text":"Nothing here is cited at all","sources":[]}]"#)
                .respond(PromptKind::Draft, draft_reply()),
        );
        let critic = Arc::new(ScriptedCritic::new(r#"{"is_publishable":false,"revisions_needed":["Cite more"]}"#));
        let outcome = orchestrator(completion, StaticSearch::new().with_default(&[A, B]), fetcher_for(&[A, B]))
            .with_critic(critic)
            .run(
                TOPIC,
                Constraints::default()
                    .with_max_rounds(rounds)
                    .with_max_revisions(revisions),
            )
            .await
            .unwrap();

        assert!(outcome.state.metrics.rounds <= rounds);
        assert!(outcome.state.metrics.write_passes <= 1 + revisions);
        assert_eq!(outcome.state.stage, Stage::Done);
    }
}

#[tokio::test]
async fn progress_runs_from_planning_to_done() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond(PromptKind::Plan, plan_reply())
            .respond(PromptKind::Claims, r#"[{"text":"Cells are shipping","sources":["S1"]}]"#)
            .respond(PromptKind::Draft, draft_reply()),
    );
    let log = Arc::new(RecordingSink::new());
    let orch = orchestrator(completion, StaticSearch::new().with_default(&[A, B]), fetcher_for(&[A, B]))
        .with_sink(log.clone());

    orch.run(TOPIC, Constraints::default().with_max_rounds(1)).await.unwrap();

    let events = log.events();
    let first = events.first().expect("events");
    let last = events.last().expect("events");
    assert_eq!((first.stage, first.percent), (Stage::Planning, 5));
    assert_eq!((last.stage, last.percent), (Stage::Done, 100));
    assert!(events.iter().all(|e| e.percent <= 100));

    let stage_events: Vec<(Stage, u8)> = events
        .iter()
        .filter(|e| e.detail.is_none())
        .map(|e| (e.stage, e.percent))
        .collect();
    assert!(stage_events.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(stage_events.contains(&(Stage::Writing, 80)));
    let fetched = events.iter().filter(|e| e.stage == Stage::Retrieving && e.detail.is_some()).count();
    assert_eq!(fetched, 2);
}
