mod support;

use chrono::{Datelike, Duration, Utc};
use review_pipeline::ports::{AuthoredPullRequest, ContributionDay, ReviewContribution};
use support::{Harness, USER};

#[tokio::test]
async fn sync_request_persists_monthly_rows() {
    let h = Harness::new().await;
    let now = Utc::now();
    let today = now.date_naive();
    h.github
        .set_activity(
            vec![
                ContributionDay {
                    date: today,
                    contribution_count: 9,
                },
                ContributionDay {
                    date: today - Duration::days(400),
                    contribution_count: 50,
                },
            ],
            vec![AuthoredPullRequest {
                created_at: now,
                title: "Add parser".into(),
                url: "https://github.com/acme/widgets/pull/1".into(),
            }],
            vec![
                ReviewContribution {
                    occurred_at: now,
                    pull_request_title: "Fix".into(),
                    pull_request_url: "https://github.com/acme/widgets/pull/2".into(),
                },
                ReviewContribution {
                    occurred_at: now,
                    pull_request_title: "Docs".into(),
                    pull_request_url: "https://github.com/acme/widgets/pull/3".into(),
                },
            ],
        )
        .await;

    h.pipeline.request_github_sync(USER).await.unwrap();
    h.wait_idle().await;

    let rows = h.pipeline.activity.monthly_stats(USER).await.unwrap();
    assert!(!rows.is_empty());
    assert!(rows.windows(2).all(|w| w[0].month > w[1].month));

    let current = format!("{:04}-{:02}", today.year(), today.month());
    let row = rows.iter().find(|r| r.month == current).unwrap();
    assert_eq!(row.total_prs, 1);
    assert_eq!(row.total_reviews, 2);
    assert_eq!(row.total_commits, 9 - 1 - 2);
}

#[tokio::test]
async fn sync_without_token_fails_terminally() {
    let h = Harness::new().await;
    h.pipeline.request_github_sync("nobody").await.unwrap();
    h.wait_idle().await;

    assert_eq!(h.github.calls("authenticated_login").await, 0);
    assert!(h.pipeline.activity.monthly_stats("nobody").await.unwrap().is_empty());
}
