//! `sync-github-stats`: refreshes the user's monthly activity rows.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::info;

use crate::activity::{ActivityWindow, StatsRange, aggregate_activity, persist_monthly};
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::events::{Event, GithubSyncRequested, names};
use crate::ports::{
    AuthoredPullRequest, ContributionDay, GithubGateway, ReviewContribution, Store,
    require_access_token,
};
use crate::step::StepContext;
use crate::workflow::Workflow;

const SYNC_RANGE: StatsRange = StatsRange::Months(6);

pub struct StatsWorkflow {
    store: Arc<dyn Store>,
    github: Arc<dyn GithubGateway>,
    concurrency: usize,
}

impl StatsWorkflow {
    pub const ID: &'static str = "sync-github-stats";

    pub fn new(store: Arc<dyn Store>, github: Arc<dyn GithubGateway>, cfg: &PipelineConfig) -> Self {
        Self {
            store,
            github,
            concurrency: cfg.stats_concurrency,
        }
    }
}

impl Workflow for StatsWorkflow {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn trigger(&self) -> &'static str {
        names::GITHUB_SYNC
    }

    fn concurrency(&self) -> Option<usize> {
        Some(self.concurrency)
    }

    fn run<'a>(
        &'a self,
        event: &'a Event,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, PipelineResult<Value>> {
        Box::pin(async move {
            let GithubSyncRequested { user_id } = event.payload()?;
            let token = require_access_token(self.store.as_ref(), &user_id).await?;

            let login: String = ctx
                .run("get-github-username", || {
                    self.github.authenticated_login(&token)
                })
                .await?;

            // Pinned so that a retry aggregates over the same window.
            let window: ActivityWindow = ctx
                .run("resolve-window", || async {
                    ActivityWindow::resolve(SYNC_RANGE, Utc::now())
                })
                .await?;

            let (calendar, prs, reviews): (
                Vec<ContributionDay>,
                Vec<AuthoredPullRequest>,
                Vec<ReviewContribution>,
            ) = futures::try_join!(
                ctx.run("fetch-contributions", || {
                    self.github
                        .contribution_calendar(&token, &login, window.start, window.end)
                }),
                ctx.run("fetch-prs", || {
                    self.github
                        .pull_requests_since(&token, &login, window.start.date_naive())
                }),
                ctx.run("fetch-reviews", || {
                    self.github
                        .review_contributions_since(&token, &login, window.start, window.end)
                }),
            )?;

            let months: usize = ctx
                .run("process-and-save-stats", || async {
                    let buckets = aggregate_activity(&window, &calendar, &prs, &reviews);
                    persist_monthly(self.store.as_ref(), &user_id, &buckets).await
                })
                .await?;

            info!(%login, months, "github stats synced");
            Ok(json!({ "success": true, "user": login, "months": months }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGithub, MemoryStepMemo, MemoryStore};
    use crate::step::RunId;

    #[tokio::test]
    async fn sync_upserts_monthly_rows_and_replays() {
        let store = Arc::new(MemoryStore::default());
        store.save_access_token("u1", "tok-1").await.unwrap();
        let github = Arc::new(MemoryGithub::default());
        github.add_token("tok-1", "octo").await;

        let now = Utc::now();
        let today = now.date_naive();
        github
            .set_activity(
                vec![ContributionDay {
                    date: today,
                    contribution_count: 6,
                }],
                vec![AuthoredPullRequest {
                    created_at: now,
                    title: "Add cache".into(),
                    url: "https://github.com/acme/widgets/pull/1".into(),
                }],
                vec![],
            )
            .await;

        let wf = StatsWorkflow::new(store.clone(), github.clone(), &PipelineConfig::default());
        let memo = Arc::new(MemoryStepMemo::default());
        let ev = Event::typed(
            crate::events::EventId::random(),
            names::GITHUB_SYNC,
            &GithubSyncRequested {
                user_id: "u1".into(),
            },
        )
        .unwrap();
        let ctx = || StepContext::new(RunId::new(StatsWorkflow::ID, ev.id), 1, memo.clone());

        let out = wf.run(&ev, &ctx()).await.unwrap();
        assert_eq!(out["user"], "octo");

        let rows = store.monthly_stats("u1").await.unwrap();
        let month = format!("{}", today.format("%Y-%m"));
        let row = rows.iter().find(|r| r.month == month).unwrap();
        assert_eq!(row.total_prs, 1);
        assert_eq!(row.total_commits, 5);

        wf.run(&ev, &ctx()).await.unwrap();
        assert_eq!(github.calls("contribution_calendar").await, 1);
        assert_eq!(store.monthly_stats("u1").await.unwrap(), rows);
    }
}
