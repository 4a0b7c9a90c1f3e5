//! Tunables shared by the workflows and services.

use std::fmt;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct PipelineConfig {
    /// Head-truncation limit for an indexed document, in chars.
    pub index_max_chars: usize,
    /// Chunks per vector upsert request.
    pub index_batch_size: usize,
    /// Context snippets retrieved per review.
    pub rag_top_k: u64,
    pub review_concurrency: usize,
    pub stats_concurrency: usize,
    pub retry: RetryPolicy,
    /// Public URL registered as a repository webhook on connect.
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    /// How long completed events and their step memo are kept; `None` keeps
    /// them forever.
    pub history_retention: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_max_chars: 8000,
            index_batch_size: 100,
            rag_top_k: 5,
            review_concurrency: 5,
            stats_concurrency: 2,
            retry: RetryPolicy::default(),
            webhook_url: None,
            webhook_secret: None,
            history_retention: Some(Duration::from_secs(30 * 24 * 60 * 60)),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("index_max_chars", &self.index_max_chars)
            .field("index_batch_size", &self.index_batch_size)
            .field("rag_top_k", &self.rag_top_k)
            .field("review_concurrency", &self.review_concurrency)
            .field("stats_concurrency", &self.stats_concurrency)
            .field("retry", &self.retry)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("history_retention", &self.history_retention)
            .finish()
    }
}
