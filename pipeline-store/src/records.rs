use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use review_pipeline::PipelineResult;
use review_pipeline::model::{
    MonthlyStat, NewRepository, NewReview, Repository, Review, ReviewStatus,
};
use review_pipeline::ports::Store;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use crate::SqliteStore;
use crate::errors::{StoreError, conflict_or};

const REPOSITORY_COLUMNS: &str =
    "id, github_id, owner, name, full_name, url, user_id, webhook_id, created_at";

const REVIEW_COLUMNS: &str =
    "v.id, v.repository_id, v.pr_number, v.pr_title, v.pr_url, v.review, v.status, v.created_at";

fn corrupt(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(StoreError::Corrupt(message)))
}

fn repository_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        github_id: row.get(1)?,
        owner: row.get(2)?,
        name: row.get(3)?,
        full_name: row.get(4)?,
        url: row.get(5)?,
        user_id: row.get(6)?,
        webhook_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn review_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let pr_number: i64 = row.get(2)?;
    let status: String = row.get(6)?;
    Ok(Review {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        pr_number: u64::try_from(pr_number)
            .map_err(|_| corrupt(2, format!("negative pr number {pr_number}")))?,
        pr_title: row.get(3)?,
        pr_url: row.get(4)?,
        review: row.get(5)?,
        status: ReviewStatus::parse(&status)
            .ok_or_else(|| corrupt(6, format!("unknown review status '{status}'")))?,
        created_at: row.get(7)?,
    })
}

fn monthly_row(row: &Row<'_>) -> rusqlite::Result<MonthlyStat> {
    Ok(MonthlyStat {
        user_id: row.get(0)?,
        month: row.get(1)?,
        year: row.get(2)?,
        total_commits: row.get(3)?,
        total_prs: row.get(4)?,
        total_reviews: row.get(5)?,
    })
}

impl Store for SqliteStore {
    fn access_token<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            Ok(c.query_row(
                "SELECT access_token FROM accounts WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?)
        }))
    }

    fn save_access_token<'a>(
        &'a self,
        user_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        let (user_id, token) = (user_id.to_string(), token.to_string());
        Box::pin(self.call(move |c| {
            c.execute(
                "INSERT INTO accounts(user_id, access_token) VALUES(?1, ?2) \
                 ON CONFLICT(user_id) DO UPDATE SET access_token = excluded.access_token",
                params![user_id, token],
            )?;
            Ok(())
        }))
    }

    fn llm_api_key<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            let key: Option<Option<String>> = c
                .query_row(
                    "SELECT llm_api_key FROM user_settings WHERE user_id = ?1",
                    params![user_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(key.flatten())
        }))
    }

    fn save_llm_api_key<'a>(
        &'a self,
        user_id: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        let (user_id, key) = (user_id.to_string(), key.to_string());
        Box::pin(self.call(move |c| {
            c.execute(
                "INSERT INTO user_settings(user_id, llm_api_key) VALUES(?1, ?2) \
                 ON CONFLICT(user_id) DO UPDATE SET llm_api_key = excluded.llm_api_key",
                params![user_id, key],
            )?;
            Ok(())
        }))
    }

    fn find_repository_by_github_id<'a>(
        &'a self,
        github_id: i64,
    ) -> BoxFuture<'a, PipelineResult<Option<Repository>>> {
        Box::pin(self.call(move |c| {
            Ok(c.query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE github_id = ?1"),
                params![github_id],
                repository_row,
            )
            .optional()?)
        }))
    }

    fn list_repositories<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<Repository>>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            let mut stmt = c.prepare(&format!(
                "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(params![user_id], repository_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }))
    }

    fn create_repository<'a>(
        &'a self,
        user_id: &'a str,
        repo: NewRepository,
    ) -> BoxFuture<'a, PipelineResult<Repository>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            let created_at: DateTime<Utc> = Utc::now();
            c.execute(
                "INSERT INTO repositories(github_id, owner, name, full_name, url, user_id, created_at) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    repo.github_id,
                    repo.owner,
                    repo.name,
                    repo.full_name,
                    repo.url,
                    user_id,
                    created_at
                ],
            )
            .map_err(|e| {
                conflict_or(e, || {
                    format!("repository {} is already connected", repo.full_name)
                })
            })?;

            Ok(Repository {
                id: c.last_insert_rowid(),
                github_id: repo.github_id,
                owner: repo.owner,
                name: repo.name,
                full_name: repo.full_name,
                url: repo.url,
                user_id,
                webhook_id: None,
                created_at,
            })
        }))
    }

    fn set_repository_webhook<'a>(
        &'a self,
        repository_id: i64,
        webhook_id: Option<i64>,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(self.call(move |c| {
            let n = c.execute(
                "UPDATE repositories SET webhook_id = ?2 WHERE id = ?1",
                params![repository_id, webhook_id],
            )?;
            if n == 0 {
                return Err(StoreError::Missing(format!("repository {repository_id}")));
            }
            Ok(())
        }))
    }

    fn delete_repository<'a>(&'a self, repository_id: i64) -> BoxFuture<'a, PipelineResult<()>> {
        // reviews go with it (ON DELETE CASCADE)
        Box::pin(self.call(move |c| {
            c.execute("DELETE FROM repositories WHERE id = ?1", params![repository_id])?;
            Ok(())
        }))
    }

    fn create_review<'a>(&'a self, review: NewReview) -> BoxFuture<'a, PipelineResult<Review>> {
        Box::pin(self.call(move |c| {
            let created_at = Utc::now();
            let pr_number = i64::try_from(review.pr_number)
                .map_err(|_| StoreError::Corrupt(format!("pr number {} out of range", review.pr_number)))?;
            c.execute(
                "INSERT INTO reviews(repository_id, pr_number, pr_title, pr_url, review, status, created_at) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    review.repository_id,
                    pr_number,
                    review.pr_title,
                    review.pr_url,
                    review.review,
                    review.status.as_str(),
                    created_at
                ],
            )?;

            Ok(Review {
                id: c.last_insert_rowid(),
                repository_id: review.repository_id,
                pr_number: review.pr_number,
                pr_title: review.pr_title,
                pr_url: review.pr_url,
                review: review.review,
                status: review.status,
                created_at,
            })
        }))
    }

    fn list_reviews<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Vec<Review>>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            let mut stmt = c.prepare(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews v \
                 JOIN repositories r ON r.id = v.repository_id \
                 WHERE r.user_id = ?1 \
                 ORDER BY v.created_at DESC, v.id DESC"
            ))?;
            let rows = stmt
                .query_map(params![user_id], review_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }))
    }

    fn upsert_monthly_stat<'a>(&'a self, stat: MonthlyStat) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(self.call(move |c| {
            c.execute(
                "INSERT INTO monthly_github_stats(user_id, month, year, total_commits, total_prs, total_reviews) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(user_id, month) DO UPDATE SET \
                    year = excluded.year, \
                    total_commits = excluded.total_commits, \
                    total_prs = excluded.total_prs, \
                    total_reviews = excluded.total_reviews",
                params![
                    stat.user_id,
                    stat.month,
                    stat.year,
                    stat.total_commits,
                    stat.total_prs,
                    stat.total_reviews
                ],
            )?;
            Ok(())
        }))
    }

    fn monthly_stats<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<MonthlyStat>>> {
        let user_id = user_id.to_string();
        Box::pin(self.call(move |c| {
            let mut stmt = c.prepare(
                "SELECT user_id, month, year, total_commits, total_prs, total_reviews \
                 FROM monthly_github_stats WHERE user_id = ?1 ORDER BY month DESC",
            )?;
            let rows = stmt
                .query_map(params![user_id], monthly_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_pipeline::PipelineError;

    fn widgets(github_id: i64) -> NewRepository {
        NewRepository {
            github_id,
            owner: "acme".into(),
            name: "widgets".into(),
            full_name: "acme/widgets".into(),
            url: "https://github.com/acme/widgets".into(),
        }
    }

    fn review(repository_id: i64, pr_number: u64, status: ReviewStatus) -> NewReview {
        NewReview {
            repository_id,
            pr_number,
            pr_title: format!("PR {pr_number}"),
            pr_url: format!("https://github.com/acme/widgets/pull/{pr_number}"),
            review: "LGTM".into(),
            status,
        }
    }

    #[tokio::test]
    async fn credentials_are_upserted() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.access_token("u1").await.unwrap(), None);
        store.save_access_token("u1", "tok-1").await.unwrap();
        store.save_access_token("u1", "tok-2").await.unwrap();
        assert_eq!(store.access_token("u1").await.unwrap().as_deref(), Some("tok-2"));

        assert_eq!(store.llm_api_key("u1").await.unwrap(), None);
        store.save_llm_api_key("u1", "sk-0123456789abcdef").await.unwrap();
        assert_eq!(
            store.llm_api_key("u1").await.unwrap().as_deref(),
            Some("sk-0123456789abcdef")
        );
    }

    #[tokio::test]
    async fn repository_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = store.create_repository("u1", widgets(1001)).await.unwrap();
        assert_eq!(repo.webhook_id, None);

        let dup = store.create_repository("u2", widgets(1001)).await.unwrap_err();
        assert!(matches!(dup, PipelineError::Validation(_)));

        store.set_repository_webhook(repo.id, Some(77)).await.unwrap();
        let found = store.find_repository_by_github_id(1001).await.unwrap().unwrap();
        assert_eq!(found.webhook_id, Some(77));
        assert_eq!(found.created_at, repo.created_at);

        assert_eq!(found.user_id, "u1");
        assert!(store.find_repository_by_github_id(2002).await.unwrap().is_none());

        let missing = store.set_repository_webhook(999, None).await.unwrap_err();
        assert!(matches!(missing, PipelineError::NotFound(_)));

        store.create_review(review(repo.id, 1, ReviewStatus::Completed)).await.unwrap();
        store.delete_repository(repo.id).await.unwrap();
        assert!(store.list_repositories("u1").await.unwrap().is_empty());
        assert!(store.list_reviews("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reviews_are_user_scoped_and_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mine = store.create_repository("u1", widgets(1)).await.unwrap();
        let theirs = store.create_repository("u2", widgets(2)).await.unwrap();

        store.create_review(review(mine.id, 1, ReviewStatus::Completed)).await.unwrap();
        store.create_review(review(mine.id, 2, ReviewStatus::Failed)).await.unwrap();
        store.create_review(review(theirs.id, 3, ReviewStatus::Completed)).await.unwrap();

        let list = store.list_reviews("u1").await.unwrap();
        assert_eq!(list.iter().map(|r| r.pr_number).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(list[0].status, ReviewStatus::Failed);
    }

    #[tokio::test]
    async fn monthly_rows_overwrite_per_month() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stat = |month: &str, commits| MonthlyStat {
            user_id: "u1".into(),
            month: month.into(),
            year: 2025,
            total_commits: commits,
            total_prs: 1,
            total_reviews: 2,
        };
        store.upsert_monthly_stat(stat("2025-01", 3)).await.unwrap();
        store.upsert_monthly_stat(stat("2025-02", 4)).await.unwrap();
        store.upsert_monthly_stat(stat("2025-01", 9)).await.unwrap();

        let rows = store.monthly_stats("u1").await.unwrap();
        assert_eq!(rows, vec![stat("2025-02", 4), stat("2025-01", 9)]);
        assert!(store.monthly_stats("u2").await.unwrap().is_empty());
    }
}
