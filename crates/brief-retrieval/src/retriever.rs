//! Concurrent retrieval
//!
//! `fetch_all` turns candidate URLs into quality-gated documents:
//! 1. Normalize and deduplicate, keeping first-seen order
//! 2. Admit at most `per_domain_cap` URLs per domain
//! 3. Fan out under a global concurrency limit; each task asks robots
//!    (bounded by `robots_timeout`, silence means allowed), then fetches
//!    (bounded by `fetch_timeout`), extracts and gates
//! 4. Fan in every task; results come back in input order
//!
//! One URL failing never affects another.

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::html::ContentExtractor;
use crate::quality::QualityGate;
use crate::quota::DomainQuota;
use crate::robots::RobotsPolicy;
use brief_core::{
    normalize_url, Constraints, Document, Failure, FailureKind, FailureStage, FetchStatus,
    NullSink, ProgressEvent, ProgressSink, Stage,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use url::Url;

/// Limits for one `fetch_all` call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// URLs admitted per domain
    pub per_domain_cap: usize,
    /// Deadline for one page fetch
    pub fetch_timeout: Duration,
    /// Deadline for one robots verdict
    pub robots_timeout: Duration,
    /// Tasks in flight at once
    pub max_concurrency: usize,
    /// Round reported in progress events
    pub round: u32,
    /// Percent range progress events are spread over
    pub progress_range: (u8, u8),
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_constraints(&Constraints::default())
    }
}

impl FetchOptions {
    /// Options from run constraints
    #[must_use]
    pub fn from_constraints(constraints: &Constraints) -> Self {
        Self {
            per_domain_cap: constraints.per_domain_cap,
            fetch_timeout: constraints.fetch_timeout,
            robots_timeout: constraints.robots_timeout,
            max_concurrency: constraints.max_concurrent_fetches,
            round: 0,
            progress_range: (0, 100),
        }
    }

    /// With round number for progress events
    #[inline]
    #[must_use]
    pub fn with_round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    /// With percent range for progress events
    #[inline]
    #[must_use]
    pub fn with_progress_range(mut self, start: u8, end: u8) -> Self {
        self.progress_range = (start.min(end), end.max(start));
        self
    }

    /// Longest a single admitted URL can take once it holds a slot
    #[must_use]
    pub fn per_task_bound(&self) -> Duration {
        self.robots_timeout + self.fetch_timeout
    }
}

/// What one `fetch_all` call produced
#[derive(Debug, Default)]
pub struct RetrievalBatch {
    /// Accepted documents, in input order
    pub documents: Vec<Document>,
    /// Per-URL failures, in input order
    pub failures: Vec<Failure>,
    /// URLs handed to fetch tasks (normalized)
    pub attempted: Vec<String>,
    /// URLs skipped because their domain was full
    pub over_cap: usize,
}

/// Collaborators a fetch task needs
struct Deps {
    robots: Arc<dyn RobotsPolicy>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    gate: QualityGate,
    sink: Arc<dyn ProgressSink>,
}

/// Polite concurrent fetcher
#[derive(Clone)]
pub struct Retriever {
    deps: Arc<Deps>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("gate", &self.deps.gate)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever from its collaborators
    #[must_use]
    pub fn new(
        robots: Arc<dyn RobotsPolicy>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            deps: Arc::new(Deps {
                robots,
                fetcher,
                extractor,
                gate: QualityGate::default(),
                sink: Arc::new(NullSink),
            }),
        }
    }

    /// With quality gate
    #[must_use]
    pub fn with_quality_gate(self, gate: QualityGate) -> Self {
        self.rebuild(|d| d.gate = gate)
    }

    /// With progress sink shared by fetch tasks
    #[must_use]
    pub fn with_sink(self, sink: Arc<dyn ProgressSink>) -> Self {
        self.rebuild(|d| d.sink = sink)
    }

    fn rebuild(self, f: impl FnOnce(&mut Deps)) -> Self {
        let mut deps = Deps {
            robots: Arc::clone(&self.deps.robots),
            fetcher: Arc::clone(&self.deps.fetcher),
            extractor: Arc::clone(&self.deps.extractor),
            gate: self.deps.gate.clone(),
            sink: Arc::clone(&self.deps.sink),
        };
        f(&mut deps);
        Self {
            deps: Arc::new(deps),
        }
    }

    /// Fetch `urls` with a fresh per-domain quota
    pub async fn fetch_all(&self, urls: &[String], opts: &FetchOptions) -> RetrievalBatch {
        let quota = DomainQuota::new(opts.per_domain_cap);
        self.fetch_all_with_quota(urls, opts, quota).await
    }

    /// Fetch `urls`, charging admissions to `quota`
    pub async fn fetch_all_with_quota(
        &self,
        urls: &[String],
        opts: &FetchOptions,
        mut quota: DomainQuota,
    ) -> RetrievalBatch {
        let mut batch = RetrievalBatch::default();
        let mut failures: Vec<(usize, Failure)> = Vec::new();
        let mut seen = HashSet::new();
        let mut admitted: Vec<(usize, Url, String)> = Vec::new();

        for (idx, raw) in urls.iter().enumerate() {
            let Some(url) = normalize_url(raw) else {
                failures.push((
                    idx,
                    Failure::non_fatal(FailureStage::Retrieving, FailureKind::InvalidUrl, "unparseable or non-http url")
                        .with_url(raw.clone()),
                ));
                continue;
            };
            if !seen.insert(url.to_string()) {
                continue;
            }
            let domain = url.host_str().unwrap_or_default().to_ascii_lowercase();
            if !quota.admit(&domain) {
                tracing::debug!(%url, %domain, "per-domain cap reached; skipping");
                batch.over_cap += 1;
                continue;
            }
            admitted.push((idx, url, domain));
        }

        let total = admitted.len();
        batch.attempted = admitted.iter().map(|(_, u, _)| u.to_string()).collect();
        tracing::info!(
            round = opts.round,
            candidates = urls.len(),
            admitted = total,
            over_cap = batch.over_cap,
            "fetching documents"
        );

        let semaphore = Arc::new(Semaphore::new(opts.max_concurrency.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        for (idx, url, domain) in admitted {
            let deps = Arc::clone(&self.deps);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let opts = opts.clone();
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_one(&deps, &url, domain, &opts).await,
                    Err(_) => Err(Failure::non_fatal(
                        FailureStage::Retrieving,
                        FailureKind::NetworkError,
                        "fetch pool closed",
                    )
                    .with_url(url.to_string())),
                };
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                deps.sink.emit(
                    ProgressEvent::new(Stage::Retrieving, opts.round, progress(&opts, done, total))
                        .with_detail(url.to_string()),
                );
                (idx, outcome)
            });
        }

        let mut documents: Vec<(usize, Document)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(doc))) => documents.push((idx, doc)),
                Ok((idx, Err(failure))) => failures.push((idx, failure)),
                Err(err) => failures.push((
                    usize::MAX,
                    Failure::non_fatal(
                        FailureStage::Retrieving,
                        FailureKind::NetworkError,
                        format!("fetch task aborted: {err}"),
                    ),
                )),
            }
        }

        documents.sort_by_key(|(idx, _)| *idx);
        failures.sort_by_key(|(idx, _)| *idx);
        batch.documents = documents.into_iter().map(|(_, d)| d).collect();
        batch.failures = failures.into_iter().map(|(_, f)| f).collect();

        metrics::counter!("brief_documents_accepted_total").increment(batch.documents.len() as u64);
        metrics::counter!("brief_fetch_failures_total").increment(batch.failures.len() as u64);
        tracing::info!(
            round = opts.round,
            documents = batch.documents.len(),
            failures = batch.failures.len(),
            "retrieval finished"
        );
        batch
    }
}

fn progress(opts: &FetchOptions, done: usize, total: usize) -> u8 {
    let (start, end) = opts.progress_range;
    let span = usize::from(end - start);
    let step = if total == 0 { span } else { span * done / total };
    start.saturating_add(u8::try_from(step).unwrap_or(u8::MAX))
}

async fn fetch_one(
    deps: &Deps,
    url: &Url,
    domain: String,
    opts: &FetchOptions,
) -> Result<Document, Failure> {
    let fail = |kind: FailureKind, detail: String| {
        Failure::non_fatal(FailureStage::Retrieving, kind, detail).with_url(url.to_string())
    };

    match timeout(opts.robots_timeout, deps.robots.is_allowed(url)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            return Err(fail(FailureKind::RobotsDisallowed, "disallowed by robots.txt".into()));
        }
        Ok(Err(err)) => {
            tracing::warn!(%url, "robots check failed ({err}); treating as allowed");
        }
        Err(_) => {
            tracing::warn!(
                %url,
                timeout_ms = opts.robots_timeout.as_millis() as u64,
                "robots check timed out; treating as allowed"
            );
        }
    }

    let page = match timeout(opts.fetch_timeout, deps.fetcher.fetch(url)).await {
        Ok(Ok(page)) => page,
        Ok(Err(err)) => return Err(fail(err.kind(), err.to_string())),
        Err(_) => {
            let err = FetchError::Timeout(opts.fetch_timeout);
            return Err(fail(err.kind(), err.to_string()));
        }
    };

    let content = deps
        .extractor
        .extract_text(&page)
        .map_err(|err| fail(err.kind(), err.to_string()))?;
    deps.gate
        .check(&content.text)
        .map_err(|rejection| fail(FailureKind::LowQuality, rejection.to_string()))?;

    tracing::debug!(%url, chars = content.text.len(), "document accepted");
    Ok(Document {
        url: url.to_string(),
        title: content.title.unwrap_or_else(|| url.to_string()),
        text: content.text,
        domain,
        fetch_status: FetchStatus {
            http_status: page.status,
            content_type: page.content_type,
            truncated: page.truncated,
        },
    })
}
