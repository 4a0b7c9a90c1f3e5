//! Persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connected GitHub repository, owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub github_id: i64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub user_id: String,
    pub webhook_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// Vector index namespace, `owner/name`.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Input for connecting a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepository {
    pub github_id: i64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Completed => "completed",
            ReviewStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "completed" => Some(ReviewStatus::Completed),
            "failed" => Some(ReviewStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub repository_id: i64,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_url: String,
    pub review: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub repository_id: i64,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_url: String,
    pub review: String,
    pub status: ReviewStatus,
}

/// Monthly activity counters, unique per `(user_id, month)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    pub user_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub year: i32,
    pub total_commits: i64,
    #[serde(rename = "totalPRs")]
    pub total_prs: i64,
    pub total_reviews: i64,
}

/// Canonical PR link stored with every review.
pub fn pull_request_url(owner: &str, repo: &str, number: u64) -> String {
    format!("https://github.com/{owner}/{repo}/pull/{number}")
}
