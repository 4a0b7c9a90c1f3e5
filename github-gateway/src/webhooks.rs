//! Repository webhooks.
//!
//!   * GET    /repos/{owner}/{repo}/hooks
//!   * POST   /repos/{owner}/{repo}/hooks
//!   * DELETE /repos/{owner}/{repo}/hooks/{id}

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ACCEPT_JSON, GitHubClient};
use crate::errors::{GitHubError, GitHubProviderError, GitHubResult};
use crate::types::RepositoryWebhook;

/// Events the pipeline subscribes a repository to.
pub const WEBHOOK_EVENTS: &[&str] = &[
    "push",
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
];

impl GitHubClient {
    pub async fn list_webhooks(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> GitHubResult<Vec<RepositoryWebhook>> {
        let url = format!("{}/hooks?per_page=100", self.repo_url(owner, repo)?);
        debug!("GitHub list_webhooks: {}", url);
        let hooks: Vec<GitHubHook> = self
            .send(self.request(Method::GET, &url, token, ACCEPT_JSON)?)
            .await?
            .json()
            .await?;
        Ok(hooks.into_iter().map(Into::into).collect())
    }

    /// Creates a JSON webhook pointing at `target_url`, signed with `secret` when given.
    pub async fn create_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        target_url: &str,
        secret: Option<&str>,
    ) -> GitHubResult<RepositoryWebhook> {
        let url = format!("{}/hooks", self.repo_url(owner, repo)?);
        let body = HookCreate {
            name: "web",
            active: true,
            events: WEBHOOK_EVENTS,
            config: HookConfig {
                url: target_url,
                content_type: "json",
                secret,
            },
        };
        let hook: GitHubHook = self
            .send(self.request(Method::POST, &url, token, ACCEPT_JSON)?.json(&body))
            .await?
            .json()
            .await?;
        info!(owner, repo, hook_id = hook.id, "webhook created");
        Ok(hook.into())
    }

    /// Deletes a webhook; one that is already gone counts as deleted.
    pub async fn delete_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: u64,
    ) -> GitHubResult<()> {
        let url = format!("{}/hooks/{}", self.repo_url(owner, repo)?, hook_id);
        match self
            .send(self.request(Method::DELETE, &url, token, ACCEPT_JSON)?)
            .await
        {
            Ok(_) => {
                info!(owner, repo, hook_id, "webhook deleted");
                Ok(())
            }
            Err(GitHubError::Provider(GitHubProviderError::NotFound)) => {
                debug!(owner, repo, hook_id, "webhook already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubHook {
    id: u64,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    config: GitHubHookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GitHubHookConfig {
    url: Option<String>,
}

impl From<GitHubHook> for RepositoryWebhook {
    fn from(h: GitHubHook) -> Self {
        Self {
            id: h.id,
            url: h.config.url,
            events: h.events,
            active: h.active,
        }
    }
}

#[derive(Serialize)]
struct HookCreate<'a> {
    name: &'a str,
    active: bool,
    events: &'a [&'a str],
    config: HookConfig<'a>,
}

#[derive(Serialize)]
struct HookConfig<'a> {
    url: &'a str,
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}
