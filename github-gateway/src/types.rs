//! Provider-agnostic shapes returned by the gateway.
//!
//! Only the fields the review pipeline consumes are modelled.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The login behind an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: u64,
    pub login: String,
}

/// One cell of the contribution calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionDay {
    pub date: NaiveDate,
    pub contribution_count: u32,
}

/// A pull request authored by the user (search result subset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredPullRequest {
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
}

/// A review the user submitted on someone's pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContribution {
    pub occurred_at: DateTime<Utc>,
    pub pull_request_title: String,
    pub pull_request_url: String,
}

/// A text file read from the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub path: String,
    pub content: String,
}

/// Pull request metadata together with its unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDiff {
    pub number: u64,
    pub title: String,
    pub description: Option<String>,
    pub html_url: String,
    pub diff: String,
}

/// A repository webhook (subset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryWebhook {
    pub id: u64,
    pub url: Option<String>,
    pub events: Vec<String>,
    pub active: bool,
}

/// A created issue/PR comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedComment {
    pub id: u64,
    pub html_url: String,
}
