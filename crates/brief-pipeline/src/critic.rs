//! Critic on top of the completion capability

use crate::collaborators::{CompletionClient, Critic};
use crate::error::ProviderError;
use crate::prompts;
use async_trait::async_trait;
use std::sync::Arc;

/// Asks the completion backend to review a report
#[derive(Clone)]
pub struct CompletionCritic {
    client: Arc<dyn CompletionClient>,
}

impl std::fmt::Debug for CompletionCritic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCritic").finish_non_exhaustive()
    }
}

impl CompletionCritic {
    /// Critic backed by `client`
    #[must_use]
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Critic for CompletionCritic {
    async fn critique(&self, topic: &str, report_text: &str) -> Result<String, ProviderError> {
        self.client.complete(&prompts::critique(topic, report_text)).await
    }
}
