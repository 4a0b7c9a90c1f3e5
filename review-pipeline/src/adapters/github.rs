use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use github_gateway::{GitHubClient, GitHubError, GitHubProviderError};

use crate::errors::{PipelineError, PipelineResult};
use crate::ports::{
    AuthoredPullRequest, ContributionDay, GithubGateway, PullRequestDiff, RepositoryFile,
    RepositoryWebhook, ReviewContribution,
};

const SERVICE: &str = "github";

/// [`GithubGateway`] over the REST/GraphQL client.
#[derive(Clone)]
pub struct GitHubAdapter {
    client: Arc<GitHubClient>,
}

impl GitHubAdapter {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

/// 401/403 → `Auth`, 404 → `NotFound`, everything transient → `Upstream`.
pub fn map_github_error(err: GitHubError) -> PipelineError {
    match err {
        GitHubError::Provider(p) => match p {
            GitHubProviderError::Unauthorized | GitHubProviderError::Forbidden => {
                PipelineError::Auth(format!("GitHub rejected the access token: {p}"))
            }
            GitHubProviderError::NotFound => PipelineError::NotFound("GitHub resource".into()),
            other => PipelineError::upstream(SERVICE, other.to_string()),
        },
        GitHubError::Config(c) => PipelineError::Auth(c.to_string()),
        GitHubError::Validation(m) => PipelineError::Validation(m),
    }
}

fn hook_id(id: u64) -> PipelineResult<i64> {
    i64::try_from(id).map_err(|_| PipelineError::upstream(SERVICE, format!("hook id {id} out of range")))
}

impl GithubGateway for GitHubAdapter {
    fn authenticated_login<'a>(&'a self, token: &'a str) -> BoxFuture<'a, PipelineResult<String>> {
        Box::pin(async move {
            let user = self
                .client
                .authenticated_user(token)
                .await
                .map_err(map_github_error)?;
            Ok(user.login)
        })
    }

    fn contribution_calendar<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ContributionDay>>> {
        Box::pin(async move {
            self.client
                .contribution_calendar(token, login, from, to)
                .await
                .map_err(map_github_error)
        })
    }

    fn pull_requests_since<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: NaiveDate,
    ) -> BoxFuture<'a, PipelineResult<Vec<AuthoredPullRequest>>> {
        Box::pin(async move {
            self.client
                .pull_requests_since(token, login, from)
                .await
                .map_err(map_github_error)
        })
    }

    fn review_contributions_since<'a>(
        &'a self,
        token: &'a str,
        login: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<ReviewContribution>>> {
        Box::pin(async move {
            self.client
                .review_contributions_since(token, login, from, to)
                .await
                .map_err(map_github_error)
        })
    }

    fn repository_files<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<RepositoryFile>>> {
        Box::pin(async move {
            self.client
                .repository_files(token, owner, repo)
                .await
                .map_err(map_github_error)
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
            self.client
                .pull_request_diff(token, owner, repo, number)
                .await
                .map_err(map_github_error)
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
            self.client
                .post_pull_request_comment(token, owner, repo, number, body)
                .await
                .map_err(map_github_error)?;
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
            self.client
                .list_webhooks(token, owner, repo)
                .await
                .map_err(map_github_error)
        })
    }

    fn create_webhook<'a>(
        &'a self,
        token: &'a str,
        owner: &'a str,
        repo: &'a str,
        url: &'a str,
        secret: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<i64>> {
        Box::pin(async move {
            let hook = self
                .client
                .create_webhook(token, owner, repo, url, secret)
                .await
                .map_err(map_github_error)?;
            hook_id(hook.id)
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
            let id = u64::try_from(hook_id)
                .map_err(|_| PipelineError::Validation(format!("invalid hook id {hook_id}")))?;
            self.client
                .delete_webhook(token, owner, repo, id)
                .await
                .map_err(map_github_error)
        })
    }
}
