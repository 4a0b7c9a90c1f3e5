//! Contribution activity: window resolution, bucketing and monthly persistence.
//!
//! Serves the synchronous dashboard path and is reused by the
//! `app/github.sync` workflow. Commits are approximated as the residual
//! `contributions - PRs - reviews`; other contribution kinds (issues,
//! discussions) end up counted as commits.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{PipelineError, PipelineResult};
use crate::model::MonthlyStat;
use crate::ports::{
    AuthoredPullRequest, ContributionDay, GithubGateway, ReviewContribution, Store,
    require_access_token,
};

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const SHORT_MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    Today,
    Week,
    Months(u32),
    All,
}

impl StatsRange {
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        match raw.trim() {
            "today" => Ok(StatsRange::Today),
            "week" => Ok(StatsRange::Week),
            "all" => Ok(StatsRange::All),
            n => n.parse::<u32>().map(StatsRange::Months).map_err(|_| {
                PipelineError::Validation(format!(
                    "range must be 'today', 'week', 'all' or a number of months, got '{raw}'"
                ))
            }),
        }
    }
}

impl FromStr for StatsRange {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for StatsRange {
    fn default() -> Self {
        StatsRange::Months(6)
    }
}

/// Inclusive time window plus its bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub daily: bool,
}

impl ActivityWindow {
    /// Anchors the window at today's 00:00 UTC. `All`, and month counts that
    /// reach further back, start at [`earliest_activity`].
    pub fn resolve(range: StatsRange, now: DateTime<Utc>) -> PipelineResult<Self> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let earliest = earliest_activity();
        let (start, daily) = match range {
            StatsRange::Today => (midnight, true),
            StatsRange::Week => (midnight - Duration::days(7), true),
            StatsRange::Months(n) => {
                let start = midnight.checked_sub_months(Months::new(n)).ok_or_else(|| {
                    PipelineError::Validation(format!("range of {n} months is out of bounds"))
                })?;
                (start.max(earliest), n <= 1)
            }
            StatsRange::All => (earliest, false),
        };
        Ok(Self {
            start,
            end: now,
            daily,
        })
    }
}

/// 2000-01-01T00:00:00Z
pub fn earliest_activity() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Aggregated activity for one day or one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBucket {
    /// `YYYY-MM-DD` (daily) or `YYYY-MM` (monthly).
    pub key: String,
    /// `Jan 5` (daily) or `January` (monthly).
    pub label: String,
    pub year: i32,
    pub total_contributions: i64,
    #[serde(rename = "totalPRs")]
    pub total_prs: i64,
    pub total_reviews: i64,
    pub active_days: i64,
}

impl ActivityBucket {
    fn empty(date: NaiveDate, daily: bool) -> Self {
        let month = date.month0() as usize;
        let (key, label) = if daily {
            (
                format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()),
                format!("{} {}", SHORT_MONTH_NAMES[month], date.day()),
            )
        } else {
            (
                format!("{:04}-{:02}", date.year(), date.month()),
                MONTH_NAMES[month].to_string(),
            )
        };
        Self {
            key,
            label,
            year: date.year(),
            total_contributions: 0,
            total_prs: 0,
            total_reviews: 0,
            active_days: 0,
        }
    }

    /// Residual rule: commits = contributions - PRs - reviews.
    pub fn total_commits(&self) -> i64 {
        self.total_contributions - self.total_prs - self.total_reviews
    }

    pub fn to_monthly_stat(&self, user_id: &str) -> MonthlyStat {
        MonthlyStat {
            user_id: user_id.to_string(),
            month: self.key.clone(),
            year: self.year,
            total_commits: self.total_commits(),
            total_prs: self.total_prs,
            total_reviews: self.total_reviews,
        }
    }
}

fn bucket<'m>(
    map: &'m mut BTreeMap<String, ActivityBucket>,
    date: NaiveDate,
    daily: bool,
) -> &'m mut ActivityBucket {
    let b = ActivityBucket::empty(date, daily);
    map.entry(b.key.clone()).or_insert(b)
}

/// Buckets the three activity streams over `window`, newest bucket first.
///
/// Records before `window.start` are ignored. Daily windows contain every day
/// from start to end, active or not.
pub fn aggregate_activity(
    window: &ActivityWindow,
    calendar: &[ContributionDay],
    prs: &[AuthoredPullRequest],
    reviews: &[ReviewContribution],
) -> Vec<ActivityBucket> {
    let daily = window.daily;
    let first_day = window.start.date_naive();
    let mut map = BTreeMap::new();

    if daily {
        let last_day = window.end.date_naive();
        let mut day = first_day;
        while day <= last_day {
            bucket(&mut map, day, true);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
    }

    for day in calendar.iter().filter(|d| d.date >= first_day) {
        if day.contribution_count > 0 {
            let b = bucket(&mut map, day.date, daily);
            b.total_contributions += i64::from(day.contribution_count);
            b.active_days += 1;
        }
    }
    for pr in prs.iter().filter(|p| p.created_at >= window.start) {
        bucket(&mut map, pr.created_at.date_naive(), daily).total_prs += 1;
    }
    for review in reviews.iter().filter(|r| r.occurred_at >= window.start) {
        bucket(&mut map, review.occurred_at.date_naive(), daily).total_reviews += 1;
    }

    map.into_values().rev().collect()
}

/// Fetches calendar, authored PRs and submitted reviews concurrently.
pub async fn fetch_activity(
    github: &dyn GithubGateway,
    token: &str,
    login: &str,
    window: &ActivityWindow,
) -> PipelineResult<(
    Vec<ContributionDay>,
    Vec<AuthoredPullRequest>,
    Vec<ReviewContribution>,
)> {
    futures::try_join!(
        github.contribution_calendar(token, login, window.start, window.end),
        github.pull_requests_since(token, login, window.start.date_naive()),
        github.review_contributions_since(token, login, window.start, window.end),
    )
}

/// Upserts one MonthlyStat per bucket; re-running overwrites.
pub async fn persist_monthly(
    store: &dyn Store,
    user_id: &str,
    buckets: &[ActivityBucket],
) -> PipelineResult<usize> {
    for b in buckets {
        store.upsert_monthly_stat(b.to_monthly_stat(user_id)).await?;
    }
    Ok(buckets.len())
}

pub struct ActivityService {
    store: Arc<dyn Store>,
    github: Arc<dyn GithubGateway>,
}

impl ActivityService {
    pub fn new(store: Arc<dyn Store>, github: Arc<dyn GithubGateway>) -> Self {
        Self { store, github }
    }

    /// Aggregates the user's activity over `range`; monthly results are persisted.
    #[instrument(skip(self))]
    pub async fn activity(
        &self,
        user_id: &str,
        range: StatsRange,
    ) -> PipelineResult<Vec<ActivityBucket>> {
        let token = require_access_token(self.store.as_ref(), user_id).await?;
        let login = self.github.authenticated_login(&token).await?;
        let window = ActivityWindow::resolve(range, Utc::now())?;

        let (calendar, prs, reviews) =
            fetch_activity(self.github.as_ref(), &token, &login, &window).await?;
        let buckets = aggregate_activity(&window, &calendar, &prs, &reviews);

        if !window.daily {
            let n = persist_monthly(self.store.as_ref(), user_id, &buckets).await?;
            debug!(months = n, "monthly stats upserted");
        }
        Ok(buckets)
    }

    pub async fn monthly_stats(&self, user_id: &str) -> PipelineResult<Vec<MonthlyStat>> {
        self.store.monthly_stats(user_id).await
    }
}
