//! Retrieval behavior against in-memory collaborators

use brief_core::{FailureKind, ProgressLog, ProgressSink, Stage};
use brief_retrieval::{AllowAll, FetchOptions, HtmlTextExtractor, PageFetcher, Retriever, RobotsPolicy};
use brief_test_utils::{article_html, DenyRobots, HangingRobots, StaticFetcher};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn retriever(robots: impl RobotsPolicy + 'static, fetcher: StaticFetcher) -> Retriever {
    Retriever::new(
        Arc::new(robots),
        Arc::new(fetcher),
        Arc::new(HtmlTextExtractor::default()),
    )
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|u| (*u).to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn hanging_robots_counts_as_allowed() {
    let fetcher = StaticFetcher::new().page("https://slow.example/a", article_html("Slow host", 160));
    let opts = FetchOptions {
        robots_timeout: Duration::from_secs(2),
        fetch_timeout: Duration::from_secs(5),
        ..FetchOptions::default()
    };

    let started = tokio::time::Instant::now();
    let batch = retriever(HangingRobots::all(), fetcher)
        .fetch_all(&urls(&["https://slow.example/a"]), &opts)
        .await;

    assert_eq!(batch.documents.len(), 1);
    assert!(batch.failures.is_empty());
    assert!(started.elapsed() <= opts.per_task_bound());
    assert_eq!(batch.documents[0].title, "Slow host");
    assert_eq!(batch.documents[0].domain, "slow.example");
}

#[tokio::test]
async fn per_domain_cap_limits_admissions() {
    let mut fetcher = StaticFetcher::new();
    let list: Vec<String> = (1..=5).map(|i| format!("https://same.example/p{i}")).collect();
    for (i, url) in list.iter().enumerate() {
        fetcher = fetcher.page(url, article_html(&format!("Page {i}"), 150));
    }
    let opts = FetchOptions {
        per_domain_cap: 2,
        ..FetchOptions::default()
    };

    let batch = retriever(AllowAll, fetcher).fetch_all(&list, &opts).await;

    assert_eq!(batch.documents.len(), 2);
    assert_eq!(batch.attempted.len(), 2);
    assert_eq!(batch.over_cap, 3);
    assert_eq!(batch.documents[0].url, "https://same.example/p1");
    assert_eq!(batch.documents[1].url, "https://same.example/p2");
}

#[tokio::test(start_paused = true)]
async fn fetches_never_exceed_the_concurrency_limit() {
    let list: Vec<String> = (1..=10).map(|i| format!("https://host{i}.example/page")).collect();
    let fetcher = list
        .iter()
        .enumerate()
        .fold(StaticFetcher::new(), |f, (i, url)| f.page(url, article_html(&format!("Page {i}"), 150)))
        .with_latency(Duration::from_millis(100));
    let fetcher = Arc::new(fetcher);
    let opts = FetchOptions {
        max_concurrency: 2,
        ..FetchOptions::default()
    };

    let r = Retriever::new(
        Arc::new(AllowAll),
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        Arc::new(HtmlTextExtractor::default()),
    );
    let started = tokio::time::Instant::now();
    let batch = r.fetch_all(&list, &opts).await;

    assert_eq!(batch.documents.len(), 10);
    assert_eq!(fetcher.fetched().len(), 10);
    assert_eq!(fetcher.peak_in_flight(), 2);
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn duplicates_are_fetched_once() {
    let fetcher = StaticFetcher::new().page("https://dup.example/a", article_html("Dup", 150));
    let list = urls(&[
        "https://dup.example/a",
        "HTTPS://DUP.EXAMPLE/a#section",
        "https://dup.example/a",
    ]);

    let r = retriever(AllowAll, fetcher);
    let batch = r.fetch_all(&list, &FetchOptions::default()).await;

    assert_eq!(batch.documents.len(), 1);
    assert_eq!(batch.attempted, vec!["https://dup.example/a".to_string()]);
}

#[tokio::test]
async fn robots_disallow_is_reported_per_url() {
    let fetcher = StaticFetcher::new()
        .page("https://open.example/a", article_html("Open", 150))
        .page("https://closed.example/private/a", article_html("Closed", 150));
    let list = urls(&["https://closed.example/private/a", "https://open.example/a"]);

    let batch = retriever(DenyRobots::prefixes(&["https://closed.example/private"]), fetcher)
        .fetch_all(&list, &FetchOptions::default())
        .await;

    assert_eq!(batch.documents.len(), 1);
    assert_eq!(batch.documents[0].domain, "open.example");
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].kind, FailureKind::RobotsDisallowed);
    assert!(!batch.failures[0].fatal);
    assert_eq!(batch.failures[0].url.as_deref(), Some("https://closed.example/private/a"));
}

#[tokio::test]
async fn thin_pages_are_low_quality() {
    let fetcher = StaticFetcher::new()
        .page("https://thin.example/stub", "<html><body><p>Coming soon.</p></body></html>")
        .page("https://loop.example/spam", format!("<p>{}</p>", "buy now ".repeat(200)));
    let list = urls(&["https://thin.example/stub", "https://loop.example/spam"]);

    let batch = retriever(AllowAll, fetcher).fetch_all(&list, &FetchOptions::default()).await;

    assert!(batch.documents.is_empty());
    let kinds: Vec<FailureKind> = batch.failures.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FailureKind::LowQuality, FailureKind::LowQuality]);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_without_blocking_others() {
    let fetcher = StaticFetcher::new()
        .hanging("https://stuck.example/a")
        .page("https://fine.example/a", article_html("Fine", 150));
    let opts = FetchOptions {
        fetch_timeout: Duration::from_secs(3),
        ..FetchOptions::default()
    };
    let list = urls(&["https://stuck.example/a", "https://fine.example/a"]);

    let batch = retriever(AllowAll, fetcher).fetch_all(&list, &opts).await;

    assert_eq!(batch.documents.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].kind, FailureKind::Timeout);
}

#[tokio::test]
async fn bad_urls_and_http_errors_are_failures() {
    let fetcher = StaticFetcher::new().status("https://gone.example/a", 410);
    let list = urls(&["ftp://files.example/x", "not a url", "https://gone.example/a"]);

    let batch = retriever(AllowAll, fetcher).fetch_all(&list, &FetchOptions::default()).await;

    let kinds: Vec<FailureKind> = batch.failures.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![FailureKind::InvalidUrl, FailureKind::InvalidUrl, FailureKind::NetworkError]
    );
}

#[tokio::test]
async fn progress_stays_inside_range() {
    let log = Arc::new(ProgressLog::default());
    let fetcher = StaticFetcher::new()
        .page("https://a.example/1", article_html("A", 150))
        .page("https://b.example/1", article_html("B", 150));
    let sink: Arc<dyn ProgressSink> = log.clone();
    let r = retriever(AllowAll, fetcher).with_sink(sink);
    let opts = FetchOptions::default().with_round(1).with_progress_range(40, 60);

    r.fetch_all(&urls(&["https://a.example/1", "https://b.example/1"]), &opts)
        .await;

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.stage == Stage::Retrieving && e.round == 1));
    assert!(events.iter().all(|e| (40..=60).contains(&e.percent)));
    assert_eq!(events.last().map(|e| e.percent), Some(60));
}
