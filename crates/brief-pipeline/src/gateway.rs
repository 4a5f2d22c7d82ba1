//! Completion calls with retry, deadline and run-level bookkeeping
//!
//! One gateway lives for one run. It decides when a provider failure is
//! fatal: the backend failed to respond after retries and has never
//! answered during this run.

use crate::collaborators::{CompletionClient, CompletionRequest};
use crate::error::ProviderError;
use brief_core::{Failure, FailureKind, FailureStage, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of a completion call the stage can continue from
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Raw response text
    Text(String),
    /// Call failed; the stage continues without it
    Degraded(Failure),
}

/// Per-run wrapper around a completion client
pub struct CompletionGateway {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    timeout: Duration,
    calls: AtomicUsize,
    successes: AtomicUsize,
}

impl std::fmt::Debug for CompletionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGateway")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("calls", &self.calls())
            .field("successes", &self.successes())
            .finish_non_exhaustive()
    }
}

impl CompletionGateway {
    /// Gateway with a fresh call history
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            retry,
            timeout,
            calls: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
        }
    }

    /// Completion calls issued (not counting retries)
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls that returned text
    #[must_use]
    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::Relaxed)
    }

    /// Call the backend
    ///
    /// `Err` carries a fatal failure and means the run must stop.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        stage: FailureStage,
    ) -> Result<Completion, Failure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind.as_str();
        metrics::counter!("brief_completion_calls_total", "kind" => kind).increment(1);

        let timeout = self.timeout;
        let result = self
            .retry
            .run(kind, |_attempt| async move {
                match tokio::time::timeout(timeout, self.client.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                }
            })
            .await;

        match result {
            Ok(text) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind, chars = text.len(), "completion received");
                Ok(Completion::Text(text))
            }
            Err(err) if err.is_unreachable() && self.successes() == 0 => {
                metrics::counter!("brief_completion_failures_total", "kind" => kind).increment(1);
                tracing::error!(kind, "completion backend unreachable: {err}");
                Err(Failure::fatal(
                    stage,
                    FailureKind::ProviderUnavailable,
                    format!("completion backend unreachable: {err}"),
                ))
            }
            Err(err) => {
                metrics::counter!("brief_completion_failures_total", "kind" => kind).increment(1);
                Ok(Completion::Degraded(Failure::non_fatal(
                    stage,
                    err.kind(),
                    format!("{kind} completion failed: {err}"),
                )))
            }
        }
    }
}
