//! Pull requests: metadata + unified diff, and PR conversation comments.
//!
//!   * GET  /repos/{owner}/{repo}/pulls/{number}            (json, then `v3.diff`)
//!   * POST /repos/{owner}/{repo}/issues/{number}/comments

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ACCEPT_JSON, GitHubClient};
use crate::errors::{GitHubError, GitHubResult};
use crate::types::{PostedComment, PullRequestDiff};

const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";

impl GitHubClient {
    /// Fetches title, description and the unified diff of a pull request.
    pub async fn pull_request_diff(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> GitHubResult<PullRequestDiff> {
        let url = format!("{}/pulls/{}", self.repo_url(owner, repo)?, number);
        debug!("GitHub pull_request_diff: {}", url);

        let meta: GitHubPr = self
            .send(self.request(Method::GET, &url, token, ACCEPT_JSON)?)
            .await?
            .json()
            .await?;

        let diff = self
            .send(self.request(Method::GET, &url, token, ACCEPT_DIFF)?)
            .await?
            .text()
            .await?;

        debug!(number, diff_len = diff.len(), "pull request diff fetched");

        Ok(PullRequestDiff {
            number: meta.number,
            title: meta.title,
            description: meta.body.filter(|b| !b.trim().is_empty()),
            html_url: meta.html_url,
            diff,
        })
    }

    /// Posts a top-level comment on the pull request conversation.
    pub async fn post_pull_request_comment(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> GitHubResult<PostedComment> {
        if body.trim().is_empty() {
            return Err(GitHubError::Validation("comment body is empty".into()));
        }
        let url = format!("{}/issues/{}/comments", self.repo_url(owner, repo)?, number);
        debug!(body_len = body.len(), "GitHub post comment: {}", url);

        let req = self
            .request(Method::POST, &url, token, ACCEPT_JSON)?
            .json(&CommentCreate { body });
        Ok(self.send(req).await?.json().await?)
    }
}

/// GitHub PR response (subset).
#[derive(Debug, Deserialize)]
struct GitHubPr {
    number: u64,
    title: String,
    body: Option<String>,
    html_url: String,
}

#[derive(Debug, Serialize)]
struct CommentCreate<'a> {
    body: &'a str,
}
