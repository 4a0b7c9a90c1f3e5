//! Capabilities the pipeline consumes.
//!
//! Production implementations live in [`crate::adapters`] (GitHub, Qdrant,
//! LLM) and in the `pipeline-store` crate (SQLite); [`crate::memory`] holds
//! in-process ones for tests and local runs.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use github_gateway::{
    AuthoredPullRequest, ContributionDay, PullRequestDiff, RepositoryFile, RepositoryWebhook,
    ReviewContribution,
};

use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, EventId};
use crate::model::{MonthlyStat, NewRepository, NewReview, Repository, Review};

pub trait GithubGateway: Send + Sync {
    fn authenticated_login<'a>(&'a self, token: &'a str) -> BoxFuture<'a, PipelineResult<String>>;

    /// Calendar days in `[from, to]`; windows over a year are allowed.
    fn contribution_calendar<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ContributionDay>>>;

    fn pull_requests_since<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: NaiveDate,
    ) -> BoxFuture<'a, PipelineResult<Vec<AuthoredPullRequest>>>;

    fn review_contributions_since<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ReviewContribution>>>;

    fn repository_files<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<RepositoryFile>>>;

    fn pull_request<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        number: u64,
    ) -> BoxFuture<'a, PipelineResult<PullRequestDiff>>;

    fn post_comment<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        number: u64,
        body: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>>;

    fn list_webhooks<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<RepositoryWebhook>>>;

    /// Returns the new hook id.
    fn create_webhook<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        url: &'a str,
        secret: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<i64>>;

    fn delete_webhook<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        hook_id: i64,
    ) -> BoxFuture<'a, PipelineResult<()>>;
}

/// A vector plus payload, keyed by a caller-level id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub namespace: String,
    pub path: String,
    pub content: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub score: f32,
    pub path: String,
    pub content: String,
}

pub trait VectorIndex: Send + Sync {
    /// Insert-or-overwrite by `IndexedChunk::id`.
    fn upsert<'a>(&'a self, chunks: Vec<IndexedChunk>) -> BoxFuture<'a, PipelineResult<usize>>;

    /// Similarity search restricted to `namespace`.
    fn query<'a>(
        &'a self,
        vector: Vec<f32>,
        namespace: &'a str,
        top_k: u64,
    ) -> BoxFuture<'a, PipelineResult<Vec<VectorMatch>>>;

    fn delete_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, PipelineResult<()>>;
}

pub trait LanguageModel: Send + Sync {
    /// Single blocking completion. `api_key` overrides the configured key.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        api_key: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<String>>;

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, PipelineResult<Vec<f32>>>;

    /// Whether a per-call `api_key` reaches the provider. Keyless providers
    /// ignore it.
    fn accepts_api_keys(&self) -> bool {
        true
    }
}

/// Typed CRUD over the relational records the pipeline touches.
pub trait Store: Send + Sync {
    /// GitHub OAuth token of the user, if linked.
    fn access_token<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>>;

    fn save_access_token<'a>(
        &'a self,
        user_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>>;

    fn llm_api_key<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>>;

    fn save_llm_api_key<'a>(
        &'a self,
        user_id: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>>;

    fn find_repository_by_github_id<'a>(
        &'a self,
        github_id: i64,
    ) -> BoxFuture<'a, PipelineResult<Option<Repository>>>;

    fn list_repositories<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<Repository>>>;

    /// Fails with `Validation` when `github_id` is already connected.
    fn create_repository<'a>(
        &'a self,
        user_id: &'a str,
        repo: NewRepository,
    ) -> BoxFuture<'a, PipelineResult<Repository>>;

    fn set_repository_webhook<'a>(
        &'a self,
        repository_id: i64,
        webhook_id: Option<i64>,
    ) -> BoxFuture<'a, PipelineResult<()>>;

    fn delete_repository<'a>(&'a self, repository_id: i64) -> BoxFuture<'a, PipelineResult<()>>;

    fn create_review<'a>(&'a self, review: NewReview) -> BoxFuture<'a, PipelineResult<Review>>;

    /// Reviews on the user's repositories, newest first.
    fn list_reviews<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Vec<Review>>>;

    /// Overwrites the row for `(user_id, month)`.
    fn upsert_monthly_stat<'a>(&'a self, stat: MonthlyStat) -> BoxFuture<'a, PipelineResult<()>>;

    /// The user's monthly rows, newest month first.
    fn monthly_stats<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<MonthlyStat>>>;
}

/// Where emitted events go.
pub trait EventSink: Send + Sync {
    fn send<'a>(&'a self, event: Event) -> BoxFuture<'a, PipelineResult<EventId>>;
}

/// The user's GitHub token; a user without one has to re-authenticate.
pub async fn require_access_token(store: &dyn Store, user_id: &str) -> PipelineResult<String> {
    store
        .access_token(user_id)
        .await?
        .ok_or_else(|| PipelineError::Auth(format!("no GitHub access token for user {user_id}")))
}
