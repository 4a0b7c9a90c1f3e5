//! Contribution statistics over GraphQL v4.
//!
//! `contributionsCollection` rejects spans longer than one year, so longer
//! windows are fetched span by span and merged.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::GitHubClient;
use crate::errors::GitHubResult;
use crate::types::{AuthoredPullRequest, ContributionDay, ReviewContribution};

/// Longest span a single `contributionsCollection` accepts.
pub const MAX_COLLECTION_SPAN_DAYS: i64 = 365;

const CONTRIBUTIONS_QUERY: &str = r#"
query ($username: String!, $from: DateTime!, $to: DateTime!) {
  user(login: $username) {
    contributionsCollection(from: $from, to: $to) {
      contributionCalendar {
        weeks { contributionDays { contributionCount date } }
      }
    }
  }
}"#;

const PR_SEARCH_QUERY: &str = r#"
query ($searchQuery: String!) {
  search(query: $searchQuery, type: ISSUE, first: 100) {
    nodes { ... on PullRequest { createdAt title url } }
  }
}"#;

const REVIEWS_QUERY: &str = r#"
query ($username: String!, $from: DateTime!, $to: DateTime!) {
  user(login: $username) {
    contributionsCollection(from: $from, to: $to) {
      pullRequestReviewContributions(first: 100) {
        nodes { occurredAt pullRequest { title url } }
      }
    }
  }
}"#;

impl GitHubClient {
    /// Contribution calendar for `[from, to]`, flattened to days, oldest first.
    pub async fn contribution_calendar(
        &self,
        token: &str,
        login: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GitHubResult<Vec<ContributionDay>> {
        let spans = collection_spans(from, to);
        let mut by_date: BTreeMap<NaiveDate, ContributionDay> = BTreeMap::new();
        for (span_from, span_to) in &spans {
            let data: UserData<CalendarCollection> = self
                .graphql(token, CONTRIBUTIONS_QUERY, span_vars(login, *span_from, *span_to))
                .await?;
            // adjacent spans share their boundary day
            for day in data.user.contributions_collection.flatten_days() {
                by_date.entry(day.date).or_insert(day);
            }
        }
        let days: Vec<ContributionDay> = by_date.into_values().collect();
        debug!(login, spans = spans.len(), days = days.len(), "contribution calendar fetched");
        Ok(days)
    }

    /// Pull requests authored by `login` created on or after `from` (first 100).
    pub async fn pull_requests_since(
        &self,
        token: &str,
        login: &str,
        from: NaiveDate,
    ) -> GitHubResult<Vec<AuthoredPullRequest>> {
        let search = pr_search_query(login, from);
        let data: SearchData = self
            .graphql(token, PR_SEARCH_QUERY, json!({ "searchQuery": search }))
            .await?;
        let prs: Vec<AuthoredPullRequest> =
            data.search.nodes.into_iter().filter_map(SearchNode::into_pr).collect();
        debug!(login, prs = prs.len(), "authored pull requests fetched");
        Ok(prs)
    }

    /// Reviews submitted by `login` in `[from, to]` (first 100 per span).
    pub async fn review_contributions_since(
        &self,
        token: &str,
        login: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GitHubResult<Vec<ReviewContribution>> {
        let spans = collection_spans(from, to);
        let mut seen = HashSet::new();
        let mut reviews = Vec::new();
        for (span_from, span_to) in &spans {
            let data: UserData<ReviewCollection> = self
                .graphql(token, REVIEWS_QUERY, span_vars(login, *span_from, *span_to))
                .await?;
            for n in data.user.contributions_collection.pull_request_review_contributions.nodes {
                if !seen.insert((n.occurred_at, n.pull_request.url.clone())) {
                    continue;
                }
                reviews.push(ReviewContribution {
                    occurred_at: n.occurred_at,
                    pull_request_title: n.pull_request.title,
                    pull_request_url: n.pull_request.url,
                });
            }
        }
        debug!(login, spans = spans.len(), reviews = reviews.len(), "review contributions fetched");
        Ok(reviews)
    }
}

/// Splits `[from, to]` into consecutive spans of at most
/// [`MAX_COLLECTION_SPAN_DAYS`], oldest first. An empty or inverted window
/// yields one span so GitHub reports it.
pub fn collection_spans(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let step = Duration::days(MAX_COLLECTION_SPAN_DAYS);
    let mut spans = Vec::new();
    let mut start = from;
    while start < to {
        let end = (start + step).min(to);
        spans.push((start, end));
        start = end;
    }
    if spans.is_empty() {
        spans.push((from, to));
    }
    spans
}

fn span_vars(login: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> serde_json::Value {
    json!({
        "username": login,
        "from": from.to_rfc3339(),
        "to": to.to_rfc3339(),
    })
}

/// `author:{login} type:pr created:>={YYYY-MM-DD}`
pub fn pr_search_query(login: &str, from: NaiveDate) -> String {
    format!("author:{} type:pr created:>={}", login, from.format("%Y-%m-%d"))
}

#[derive(Deserialize)]
struct UserData<C> {
    user: UserNode<C>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserNode<C> {
    contributions_collection: C,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarCollection {
    contribution_calendar: Calendar,
}

impl CalendarCollection {
    fn flatten_days(self) -> impl Iterator<Item = ContributionDay> {
        self.contribution_calendar
            .weeks
            .into_iter()
            .flat_map(|w| w.contribution_days)
    }
}

#[derive(Deserialize)]
struct Calendar {
    weeks: Vec<Week>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Week {
    contribution_days: Vec<ContributionDay>,
}

#[derive(Deserialize)]
struct SearchData {
    search: SearchNodes,
}

#[derive(Deserialize)]
struct SearchNodes {
    nodes: Vec<SearchNode>,
}

/// Non-PR hits come back as `{}` because of the inline fragment.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNode {
    created_at: Option<DateTime<Utc>>,
    title: Option<String>,
    url: Option<String>,
}

impl SearchNode {
    fn into_pr(self) -> Option<AuthoredPullRequest> {
        Some(AuthoredPullRequest {
            created_at: self.created_at?,
            title: self.title?,
            url: self.url?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewCollection {
    pull_request_review_contributions: ReviewNodes,
}

#[derive(Deserialize)]
struct ReviewNodes {
    nodes: Vec<ReviewNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewNode {
    occurred_at: DateTime<Utc>,
    pull_request: ReviewedPr,
}

#[derive(Deserialize)]
struct ReviewedPr {
    title: String,
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_format() {
        let from = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(
            pr_search_query("octocat", from),
            "author:octocat type:pr created:>=2025-04-01"
        );
    }

    #[test]
    fn calendar_flattens_weeks() {
        let raw = r##"{"user":{"contributionsCollection":{"contributionCalendar":{"weeks":[
            {"contributionDays":[{"contributionCount":0,"date":"2025-01-05","color":"#ebedf0"}]},
            {"contributionDays":[{"contributionCount":3,"date":"2025-01-12"},{"contributionCount":1,"date":"2025-01-13"}]}
        ]}}}}"##;
        let data: UserData<CalendarCollection> = serde_json::from_str(raw).unwrap();
        let days: Vec<ContributionDay> = data.user.contributions_collection.flatten_days().collect();
        assert_eq!(days.len(), 3);
        assert_eq!(days[1].contribution_count, 3);
    }

    #[test]
    fn long_windows_split_into_year_spans() {
        use chrono::TimeZone;
        let from = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2003, 6, 1, 12, 0, 0).unwrap();

        let spans = collection_spans(from, to);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[0].0, from);
        assert_eq!(spans[3].1, to);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        for (a, b) in &spans {
            assert!(*b - *a <= Duration::days(MAX_COLLECTION_SPAN_DAYS));
        }

        let short = collection_spans(from, from + Duration::days(30));
        assert_eq!(short, vec![(from, from + Duration::days(30))]);
        assert_eq!(collection_spans(to, from), vec![(to, from)]);
    }

    #[test]
    fn search_skips_non_pr_nodes() {
        let raw = r#"{"search":{"nodes":[{},{"createdAt":"2025-03-01T10:00:00Z","title":"Fix","url":"https://github.com/a/b/pull/1"}]}}"#;
        let data: SearchData = serde_json::from_str(raw).unwrap();
        let prs: Vec<_> = data.search.nodes.into_iter().filter_map(SearchNode::into_pr).collect();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].title, "Fix");
    }
}
