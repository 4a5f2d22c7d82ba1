//! Query execution and result filtering (first half of RETRIEVING)

use crate::collaborators::SearchProvider;
use crate::error::ProviderError;
use brief_core::{domain_of, Failure, FailureStage, RetryPolicy, SearchResult};
use futures::stream::{self, StreamExt};
use std::time::Duration;

/// Limits for one batch of queries
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Results requested per query
    pub results_per_query: usize,
    /// Queries in flight at once
    pub max_concurrent: usize,
    /// Deadline per search call
    pub timeout: Duration,
    /// Retry policy per query
    pub retry: RetryPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            results_per_query: 8,
            max_concurrent: 3,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

/// What a batch of queries produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRound {
    /// Results in query order, then rank order
    pub results: Vec<SearchResult>,
    /// Queries that failed and were dropped
    pub failures: Vec<Failure>,
    /// Queries sent
    pub executed: usize,
}

/// Run `queries` against the search backend
///
/// A failing query is dropped and recorded; it never stops the others.
pub async fn run_queries(
    provider: &dyn SearchProvider,
    queries: &[String],
    opts: &SearchOptions,
) -> SearchRound {
    let outcomes: Vec<(&String, Result<Vec<SearchResult>, ProviderError>)> = stream::iter(queries)
        .map(|query| async move {
            let result = opts
                .retry
                .run("search", |_attempt| async move {
                    match tokio::time::timeout(
                        opts.timeout,
                        provider.search(query, opts.results_per_query),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout {
                            duration_ms: u64::try_from(opts.timeout.as_millis()).unwrap_or(u64::MAX),
                        }),
                    }
                })
                .await;
            (query, result)
        })
        .buffered(opts.max_concurrent.max(1))
        .collect()
        .await;

    let mut round = SearchRound {
        executed: queries.len(),
        ..SearchRound::default()
    };
    for (query, outcome) in outcomes {
        match outcome {
            Ok(results) => {
                tracing::debug!(query = %query, results = results.len(), "search returned");
                round
                    .results
                    .extend(results.into_iter().take(opts.results_per_query));
            }
            Err(err) => round.failures.push(Failure::non_fatal(
                FailureStage::Retrieving,
                err.kind(),
                format!("search for {query:?} failed: {err}"),
            )),
        }
    }
    metrics::counter!("brief_search_queries_total").increment(queries.len() as u64);
    round
}

/// Keep results allowed by the include/exclude domain lists
///
/// A listed domain also matches its subdomains.
#[must_use]
pub fn filter_domains(
    results: Vec<SearchResult>,
    include: &[String],
    exclude: &[String],
) -> Vec<SearchResult> {
    if include.is_empty() && exclude.is_empty() {
        return results;
    }
    results
        .into_iter()
        .filter(|result| {
            let Some(host) = domain_of(&result.url) else {
                return false;
            };
            let listed = |domains: &[String]| domains.iter().any(|d| host_matches(&host, d));
            (include.is_empty() || listed(include)) && !listed(exclude)
        })
        .collect()
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("*.").to_ascii_lowercase();
    !domain.is_empty()
        && (host == domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn results(urls: &[&str]) -> Vec<SearchResult> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| SearchResult::new(*u, "t", i as u32 + 1))
            .collect()
    }

    fn urls(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn include_list_keeps_subdomains() {
        let kept = filter_domains(
            results(&["https://docs.rust-lang.org/a", "https://notrust-lang.org/b", "https://x.example/c"]),
            &["rust-lang.org".into()],
            &[],
        );
        assert_eq!(urls(&kept), vec!["https://docs.rust-lang.org/a"]);
    }

    #[test]
    fn exclude_list_wins() {
        let kept = filter_domains(
            results(&["https://a.example/1", "https://spam.example/2", "not a url"]),
            &[],
            &["spam.example".into()],
        );
        assert_eq!(urls(&kept), vec!["https://a.example/1"]);
    }

    #[test]
    fn no_lists_is_identity() {
        let input = results(&["not a url"]);
        assert_eq!(filter_domains(input.clone(), &[], &[]), input);
    }
}
