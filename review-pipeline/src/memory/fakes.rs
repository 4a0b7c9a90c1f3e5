//! Scripted fakes for the external capabilities: GitHub, the language model
//! and the event sink. Each records what it was asked to do.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, EventId};
use crate::ports::{
    AuthoredPullRequest, ContributionDay, EventSink, GithubGateway, LanguageModel,
    PullRequestDiff, RepositoryFile, RepositoryWebhook, ReviewContribution,
};

/* ------------------------------ event sink ------------------------------- */

/// Keeps every sent event; nothing is dispatched.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn named(&self, name: &str) -> Vec<Event> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn send<'a>(&'a self, event: Event) -> BoxFuture<'a, PipelineResult<EventId>> {
        Box::pin(async move {
            let id = event.id;
            self.events.lock().await.push(event);
            Ok(id)
        })
    }
}

/* --------------------------------- github -------------------------------- */

/// A comment posted through [`MemoryGithub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub body: String,
}

/// Scriptable GitHub: tokens, repository contents, PRs and activity are
/// seeded up front; comments and webhooks are recorded.
#[derive(Default)]
pub struct MemoryGithub {
    state: RwLock<GithubState>,
}

#[derive(Default)]
struct GithubState {
    logins: HashMap<String, String>,
    files: HashMap<String, Vec<RepositoryFile>>,
    pulls: HashMap<(String, u64), PullRequestDiff>,
    calendar: Vec<ContributionDay>,
    authored: Vec<AuthoredPullRequest>,
    reviews: Vec<ReviewContribution>,
    comments: Vec<RecordedComment>,
    webhooks: HashMap<String, Vec<RepositoryWebhook>>,
    next_hook: u64,
    failures: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, usize>,
}

/// GitHub resolves owner and repository names case-insensitively.
fn full_name(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}").to_lowercase()
}

impl MemoryGithub {
    pub async fn add_token(&self, token: &str, login: &str) {
        self.state
            .write()
            .await
            .logins
            .insert(token.to_string(), login.to_string());
    }

    pub async fn add_files(&self, owner: &str, repo: &str, files: Vec<RepositoryFile>) {
        self.state
            .write()
            .await
            .files
            .insert(full_name(owner, repo), files);
    }

    pub async fn add_pull_request(&self, owner: &str, repo: &str, pr: PullRequestDiff) {
        self.state
            .write()
            .await
            .pulls
            .insert((full_name(owner, repo), pr.number), pr);
    }

    pub async fn set_activity(
        &self,
        calendar: Vec<ContributionDay>,
        authored: Vec<AuthoredPullRequest>,
        reviews: Vec<ReviewContribution>,
    ) {
        let mut state = self.state.write().await;
        state.calendar = calendar;
        state.authored = authored;
        state.reviews = reviews;
    }

    /// The next `times` calls of `op` fail with a transient upstream error.
    pub async fn fail_next(&self, op: &'static str, times: u32) {
        self.state.write().await.failures.insert(op, times);
    }

    pub async fn comments(&self) -> Vec<RecordedComment> {
        self.state.read().await.comments.clone()
    }

    pub async fn webhooks(&self, owner: &str, repo: &str) -> Vec<RepositoryWebhook> {
        self.state
            .read()
            .await
            .webhooks
            .get(&full_name(owner, repo))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn calls(&self, op: &str) -> usize {
        self.state.read().await.calls.get(op).copied().unwrap_or(0)
    }

    /// Counts the call, authenticates `token` and applies injected failures.
    async fn enter(&self, op: &'static str, token: &str) -> PipelineResult<String> {
        let mut state = self.state.write().await;
        *state.calls.entry(op).or_default() += 1;
        if let Some(left) = state.failures.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(PipelineError::upstream("github", format!("{op}: 502 Bad Gateway")));
            }
        }
        state
            .logins
            .get(token)
            .cloned()
            .ok_or_else(|| PipelineError::Auth("bad credentials".into()))
    }
}

impl GithubGateway for MemoryGithub {
    fn authenticated_login<'a>(&'a self, token: &'a str) -> BoxFuture<'a, PipelineResult<String>> {
        Box::pin(self.enter("authenticated_login", token))
    }

    fn contribution_calendar<'a>(
        &'a self,
        token: &'a str,
        _login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ContributionDay>>> {
        Box::pin(async move {
            self.enter("contribution_calendar", token).await?;
            Ok(self
                .state
                .read()
                .await
                .calendar
                .iter()
                .filter(|d| d.date >= from.date_naive() && d.date <= to.date_naive())
                .cloned()
                .collect())
        })
    }

    fn pull_requests_since<'a>(
        &'a self,
        token: &'a str,
        _login: &'a str,
        from: NaiveDate,
    ) -> BoxFuture<'a, PipelineResult<Vec<AuthoredPullRequest>>> {
        Box::pin(async move {
            self.enter("pull_requests_since", token).await?;
            Ok(self
                .state
                .read()
                .await
                .authored
                .iter()
                .filter(|p| p.created_at.date_naive() >= from)
                .cloned()
                .collect())
        })
    }

    fn review_contributions_since<'a>(
        &'a self,
        token: &'a str,
        _login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ReviewContribution>>> {
        Box::pin(async move {
            self.enter("review_contributions_since", token).await?;
            Ok(self
                .state
                .read()
                .await
                .reviews
                .iter()
                .filter(|r| r.occurred_at >= from && r.occurred_at <= to)
                .cloned()
                .collect())
        })
    }

    fn repository_files<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<RepositoryFile>>> {
        Box::pin(async move {
            self.enter("repository_files", token).await?;
            let name = full_name(owner, repo);
            self.state
                .read()
                .await
                .files
                .get(&name)
                .cloned()
                .ok_or_else(|| PipelineError::NotFound(format!("repository {name}")))
        })
    }

    fn pull_request<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        number: u64,
    ) -> BoxFuture<'a, PipelineResult<PullRequestDiff>> {
        Box::pin(async move {
            self.enter("pull_request", token).await?;
            let name = full_name(owner, repo);
            self.state
                .read()
                .await
                .pulls
                .get(&(name.clone(), number))
                .cloned()
                .ok_or_else(|| PipelineError::NotFound(format!("pull request {name}#{number}")))
        })
    }

    fn post_comment<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        number: u64,
        body: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.enter("post_comment", token).await?;
            self.state.write().await.comments.push(RecordedComment {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
                body: body.to_string(),
            });
            Ok(())
        })
    }

    fn list_webhooks<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<RepositoryWebhook>>> {
        Box::pin(async move {
            self.enter("list_webhooks", token).await?;
            Ok(self.webhooks(owner, repo).await)
        })
    }

    fn create_webhook<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        url: &'a str,
        _secret: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<i64>> {
        Box::pin(async move {
            self.enter("create_webhook", token).await?;
            let mut state = self.state.write().await;
            state.next_hook += 1;
            let id = state.next_hook;
            state
                .webhooks
                .entry(full_name(owner, repo))
                .or_default()
                .push(RepositoryWebhook {
                    id,
                    url: Some(url.to_string()),
                    events: vec!["push".into(), "pull_request".into()],
                    active: true,
                });
            i64::try_from(id).map_err(|_| PipelineError::upstream("github", "hook id overflow"))
        })
    }

    fn delete_webhook<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        hook_id: i64,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.enter("delete_webhook", token).await?;
            if let Some(hooks) = self.state.write().await.webhooks.get_mut(&full_name(owner, repo)) {
                hooks.retain(|h| i64::try_from(h.id).ok() != Some(hook_id));
            }
            Ok(())
        })
    }
}

/* ------------------------------ language model --------------------------- */

/// Deterministic model: embeddings are byte histograms, completions are a
/// canned review. Records prompts and tracks peak concurrency.
pub struct MemoryLanguageModel {
    latency: Duration,
    keyless: bool,
    rejected_keys: Mutex<HashSet<String>>,
    prompts: Mutex<Vec<String>>,
    failing_embeds: Mutex<HashSet<String>>,
    generate_failures: Mutex<u32>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub const EMBEDDING_DIM: usize = 16;

impl Default for MemoryLanguageModel {
    fn default() -> Self {
        Self::with_latency(Duration::ZERO)
    }
}

impl MemoryLanguageModel {
    /// Every `generate` call sleeps for `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            keyless: false,
            rejected_keys: Mutex::new(HashSet::new()),
            prompts: Mutex::new(Vec::new()),
            failing_embeds: Mutex::new(HashSet::new()),
            generate_failures: Mutex::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Behaves like a provider that takes no API key.
    pub fn keyless(mut self) -> Self {
        self.keyless = true;
        self
    }

    pub async fn reject_key(&self, key: &str) {
        self.rejected_keys.lock().await.insert(key.to_string());
    }

    /// Embedding any text containing `needle` fails.
    pub async fn fail_embedding_of(&self, needle: &str) {
        self.failing_embeds.lock().await.insert(needle.to_string());
    }

    pub async fn fail_next_generations(&self, times: u32) {
        *self.generate_failures.lock().await = times;
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn complete(&self, prompt: &str, api_key: Option<&str>) -> PipelineResult<String> {
        if let Some(key) = api_key.filter(|_| !self.keyless) {
            if self.rejected_keys.lock().await.contains(key) {
                return Err(PipelineError::Auth("401 invalid api key".into()));
            }
        }
        {
            let mut left = self.generate_failures.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(PipelineError::upstream("llm", "503 overloaded"));
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.prompts.lock().await.push(prompt.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok("## Walkthrough\n\nLooks reasonable.\n\n## Summary\n\nNo blocking issues.".into())
    }
}

/// Normalised byte histogram; similar texts land close together.
pub fn histogram_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; EMBEDDING_DIM];
    for b in text.bytes() {
        v[usize::from(b) % EMBEDDING_DIM] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

impl LanguageModel for MemoryLanguageModel {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        api_key: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<String>> {
        Box::pin(self.complete(prompt, api_key))
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, PipelineResult<Vec<f32>>> {
        Box::pin(async move {
            if self
                .failing_embeds
                .lock()
                .await
                .iter()
                .any(|needle| text.contains(needle.as_str()))
            {
                return Err(PipelineError::upstream("llm", "embedding rejected"));
            }
            Ok(histogram_embedding(text))
        })
    }

    fn accepts_api_keys(&self) -> bool {
        !self.keyless
    }
}
