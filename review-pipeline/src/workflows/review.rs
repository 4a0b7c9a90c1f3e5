//! `generate-review`: RAG-grounded review of one pull request.
//!
//! Steps, each memoized per run:
//! `fetch-pr-data` → `retrieve-context` → `generate-ai-review` →
//! `post-comment` → `save-review`.
//!
//! Credentials (GitHub token, the user's LLM key) are looked up on every
//! attempt and never enter the memo.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, ReviewRequested, names};
use crate::model::{NewReview, Repository, ReviewStatus, pull_request_url};
use crate::ports::{GithubGateway, LanguageModel, Store, VectorIndex, require_access_token};
use crate::step::StepContext;
use crate::workflow::Workflow;
use crate::workflows::prompt::{build_review_prompt, format_review_comment};

const FAILURE_NOTE: &str =
    "Review generation failed after repeated attempts. The pull request was not reviewed.";

/// Output of `fetch-pr-data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrData {
    repository_id: i64,
    namespace: String,
    title: String,
    description: Option<String>,
    diff: String,
}

pub struct ReviewWorkflow {
    store: Arc<dyn Store>,
    github: Arc<dyn GithubGateway>,
    llm: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    top_k: u64,
    concurrency: usize,
}

impl ReviewWorkflow {
    pub const ID: &'static str = "generate-review";

    pub fn new(
        store: Arc<dyn Store>,
        github: Arc<dyn GithubGateway>,
        llm: Arc<dyn LanguageModel>,
        vectors: Arc<dyn VectorIndex>,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            github,
            llm,
            vectors,
            top_k: cfg.rag_top_k,
            concurrency: cfg.review_concurrency,
        }
    }

    /// The connected record the request refers to, by GitHub id. The hook's
    /// owner/name may differ from the stored one in case or after a rename.
    async fn connected_repository(&self, req: &ReviewRequested) -> PipelineResult<Repository> {
        self.store
            .find_repository_by_github_id(req.github_id)
            .await?
            .filter(|r| r.user_id == req.user_id)
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "repository {}/{} (github id {})",
                    req.owner, req.repo, req.github_id
                ))
            })
    }

    async fn fetch_pr_data(&self, token: &str, req: &ReviewRequested) -> PipelineResult<PrData> {
        let repository = self.connected_repository(req).await?;

        let pr = self
            .github
            .pull_request(token, &req.owner, &req.repo, req.pr_number)
            .await?;

        Ok(PrData {
            repository_id: repository.id,
            namespace: repository.namespace(),
            title: pr.title,
            description: pr.description,
            diff: pr.diff,
        })
    }

    /// Similar snippets from the repository's namespace. Any failure yields
    /// no context rather than failing the review.
    async fn retrieve_context(&self, query: &str, namespace: &str) -> Vec<String> {
        let vector = match self.llm.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed; reviewing without context");
                return Vec::new();
            }
        };
        match self.vectors.query(vector, namespace, self.top_k).await {
            Ok(hits) => hits
                .into_iter()
                .map(|h| h.content)
                .filter(|c| !c.is_empty())
                .collect(),
            Err(e) => {
                warn!(error = %e, "context retrieval failed; reviewing without context");
                Vec::new()
            }
        }
    }
}

impl Workflow for ReviewWorkflow {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn trigger(&self) -> &'static str {
        names::PR_REVIEW_REQUESTED
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
            let req: ReviewRequested = event.payload()?;
            let token = require_access_token(self.store.as_ref(), &req.user_id).await?;

            let pr: PrData = ctx
                .run("fetch-pr-data", || self.fetch_pr_data(&token, &req))
                .await?;

            let context: Vec<String> = ctx
                .run("retrieve-context", || async {
                    let query = format!(
                        "{}\n{}",
                        pr.title,
                        pr.description.as_deref().unwrap_or_default()
                    );
                    Ok(self.retrieve_context(&query, &pr.namespace).await)
                })
                .await?;
            debug!(snippets = context.len(), "context retrieved");

            let user_key = self.store.llm_api_key(&req.user_id).await?;
            let review: String = ctx
                .run("generate-ai-review", || async {
                    let prompt =
                        build_review_prompt(&pr.title, pr.description.as_deref(), &context, &pr.diff);
                    self.llm.generate(&prompt, user_key.as_deref()).await
                })
                .await?;

            let _posted: bool = ctx
                .run("post-comment", || async {
                    let body = format_review_comment(&review);
                    self.github
                        .post_comment(&token, &req.owner, &req.repo, req.pr_number, &body)
                        .await?;
                    Ok(true)
                })
                .await?;

            let review_id: i64 = ctx
                .run("save-review", || async {
                    let saved = self
                        .store
                        .create_review(NewReview {
                            repository_id: pr.repository_id,
                            pr_number: req.pr_number,
                            pr_title: pr.title.clone(),
                            pr_url: pull_request_url(&req.owner, &req.repo, req.pr_number),
                            review: review.clone(),
                            status: ReviewStatus::Completed,
                        })
                        .await?;
                    Ok(saved.id)
                })
                .await?;

            info!(
                repository = %pr.namespace,
                pr_number = req.pr_number,
                review_id,
                "review posted"
            );
            Ok(json!({ "success": true, "reviewId": review_id }))
        })
    }

    /// Leaves a `failed` row so the failure is visible in the review history.
    /// The title comes from `fetch-pr-data` when that step completed.
    fn on_failure<'a>(
        &'a self,
        event: &'a Event,
        ctx: &'a StepContext,
        err: &'a PipelineError,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if matches!(err, PipelineError::NotFound(_)) {
                return;
            }
            let Ok(req) = event.payload::<ReviewRequested>() else {
                return;
            };

            let repository = match self.connected_repository(&req).await {
                Ok(r) => r,
                Err(PipelineError::NotFound(_)) => return,
                Err(e) => {
                    error!(error = %e, "could not resolve repository for failure record");
                    return;
                }
            };

            let title = match ctx.recall::<PrData>("fetch-pr-data").await {
                Ok(Some(pr)) => pr.title,
                Ok(None) => format!("PR #{}", req.pr_number),
                Err(e) => {
                    warn!(error = %e, "memoized pull request unreadable; using placeholder title");
                    format!("PR #{}", req.pr_number)
                }
            };

            let row = NewReview {
                repository_id: repository.id,
                pr_number: req.pr_number,
                pr_title: title,
                pr_url: pull_request_url(&req.owner, &req.repo, req.pr_number),
                review: FAILURE_NOTE.to_string(),
                status: ReviewStatus::Failed,
            };
            if let Err(e) = self.store.create_review(row).await {
                error!(error = %e, "could not record failed review");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryGithub, MemoryLanguageModel, MemoryStepMemo, MemoryStore, MemoryVectorIndex,
    };
    use crate::model::NewRepository;
    use crate::ports::{IndexedChunk, PullRequestDiff};
    use crate::step::{RunId, StepMemo};

    struct Fixture {
        wf: ReviewWorkflow,
        store: Arc<MemoryStore>,
        github: Arc<MemoryGithub>,
        llm: Arc<MemoryLanguageModel>,
        vectors: Arc<MemoryVectorIndex>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        store.save_access_token("u1", "tok-1").await.unwrap();
        store
            .create_repository(
                "u1",
                NewRepository {
                    github_id: 1001,
                    owner: "acme".into(),
                    name: "widgets".into(),
                    full_name: "acme/widgets".into(),
                    url: "https://github.com/acme/widgets".into(),
                },
            )
            .await
            .unwrap();

        let github = Arc::new(MemoryGithub::default());
        github.add_token("tok-1", "octo").await;
        github
            .add_pull_request(
                "acme",
                "widgets",
                PullRequestDiff {
                    number: 42,
                    title: "Add caching".into(),
                    description: Some("LRU in front of the parser".into()),
                    html_url: "https://github.com/acme/widgets/pull/42".into(),
                    diff: "+let cache = Lru::new(64);".into(),
                },
            )
            .await;

        let llm = Arc::new(MemoryLanguageModel::default());
        let vectors = Arc::new(MemoryVectorIndex::default());
        let wf = ReviewWorkflow::new(
            store.clone(),
            github.clone(),
            llm.clone(),
            vectors.clone(),
            &PipelineConfig::default(),
        );
        Fixture {
            wf,
            store,
            github,
            llm,
            vectors,
        }
    }

    fn request(pr_number: u64) -> Event {
        Event::typed(
            crate::events::EventId::from_seed("delivery-1:pr.review.requested"),
            names::PR_REVIEW_REQUESTED,
            &ReviewRequested {
                owner: "acme".into(),
                repo: "widgets".into(),
                github_id: 1001,
                pr_number,
                user_id: "u1".into(),
            },
        )
        .unwrap()
    }

    fn ctx(memo: &Arc<MemoryStepMemo>, event: &Event) -> StepContext {
        StepContext::new(RunId::new(ReviewWorkflow::ID, event.id), 1, memo.clone())
    }

    #[tokio::test]
    async fn happy_path_posts_and_saves() {
        let f = fixture().await;
        f.vectors
            .upsert(vec![IndexedChunk {
                id: "acme/widgets-src_parser_rs".into(),
                namespace: "acme/widgets".into(),
                path: "src/parser.rs".into(),
                content: "File: src/parser.rs\n\npub fn parse() {}".into(),
                vector: crate::memory::histogram_embedding("parser"),
            }])
            .await
            .unwrap();

        let memo = Arc::new(MemoryStepMemo::default());
        let ev = request(42);
        let out = f.wf.run(&ev, &ctx(&memo, &ev)).await.unwrap();
        assert_eq!(out["success"], true);

        let comments = f.github.comments().await;
        assert_eq!(comments.len(), 1);
        assert!(comments[0].body.starts_with("## AI Code Review"));

        let prompts = f.llm.prompts().await;
        assert!(prompts[0].contains("pub fn parse() {}"));

        let rows = f.store.list_reviews("u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReviewStatus::Completed);
        assert_eq!(rows[0].pr_url, "https://github.com/acme/widgets/pull/42");
        assert_eq!(out["reviewId"], rows[0].id);
    }

    #[tokio::test]
    async fn completed_steps_are_not_repeated_on_retry() {
        let f = fixture().await;
        f.github.fail_next("post_comment", 1).await;
        let memo = Arc::new(MemoryStepMemo::default());
        let ev = request(42);

        let err = f.wf.run(&ev, &ctx(&memo, &ev)).await.unwrap_err();
        assert!(err.is_retryable());
        f.wf.run(&ev, &ctx(&memo, &ev)).await.unwrap();

        assert_eq!(f.llm.prompts().await.len(), 1);
        assert_eq!(f.github.calls("pull_request").await, 1);
        assert_eq!(f.github.comments().await.len(), 1);
        let run = RunId::new(ReviewWorkflow::ID, ev.id);
        assert!(memo.load(&run, "save-review").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let f = fixture().await;
        let memo = Arc::new(MemoryStepMemo::default());
        let ev = Event::typed(
            crate::events::EventId::random(),
            names::PR_REVIEW_REQUESTED,
            &ReviewRequested {
                owner: "acme".into(),
                repo: "gadgets".into(),
                github_id: 2002,
                pr_number: 1,
                user_id: "u1".into(),
            },
        )
        .unwrap();
        let c = ctx(&memo, &ev);
        let err = f.wf.run(&ev, &c).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        f.wf.on_failure(&ev, &c, &err).await;
        assert!(f.store.all_reviews().await.is_empty());
    }

    #[tokio::test]
    async fn failure_before_fetch_records_placeholder_title() {
        let f = fixture().await;
        let memo = Arc::new(MemoryStepMemo::default());
        let ev = request(42);
        f.wf
            .on_failure(&ev, &ctx(&memo, &ev), &PipelineError::upstream("github", "502"))
            .await;

        let rows = f.store.list_reviews("u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReviewStatus::Failed);
        assert_eq!(rows[0].pr_title, "PR #42");
    }

    #[tokio::test]
    async fn failed_row_keeps_the_fetched_title() {
        let f = fixture().await;
        f.llm.fail_next_generations(1).await;
        let memo = Arc::new(MemoryStepMemo::default());
        let ev = request(42);
        let c = ctx(&memo, &ev);

        let err = f.wf.run(&ev, &c).await.unwrap_err();
        f.wf.on_failure(&ev, &c, &err).await;

        let rows = f.store.list_reviews("u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReviewStatus::Failed);
        assert_eq!(rows[0].pr_title, "Add caching");
        assert!(f.github.comments().await.is_empty());
    }

    #[tokio::test]
    async fn stored_name_casing_does_not_drop_the_review() {
        let f = fixture().await;
        f.store
            .create_repository(
                "u2",
                NewRepository {
                    github_id: 3003,
                    owner: "Octo-Org".into(),
                    name: "Gizmo".into(),
                    full_name: "Octo-Org/Gizmo".into(),
                    url: "https://github.com/Octo-Org/Gizmo".into(),
                },
            )
            .await
            .unwrap();
        f.store.save_access_token("u2", "tok-1").await.unwrap();
        f.github
            .add_pull_request(
                "octo-org",
                "gizmo",
                PullRequestDiff {
                    number: 5,
                    title: "Tidy".into(),
                    description: None,
                    html_url: "https://github.com/octo-org/gizmo/pull/5".into(),
                    diff: "-old\n+new".into(),
                },
            )
            .await;
        f.vectors
            .upsert(vec![IndexedChunk {
                id: "Octo-Org/Gizmo-lib_rs".into(),
                namespace: "Octo-Org/Gizmo".into(),
                path: "lib.rs".into(),
                content: "File: lib.rs\n\npub fn tidy() {}".into(),
                vector: crate::memory::histogram_embedding("tidy"),
            }])
            .await
            .unwrap();

        let memo = Arc::new(MemoryStepMemo::default());
        let ev = Event::typed(
            crate::events::EventId::from_seed("delivery-5:pr.review.requested"),
            names::PR_REVIEW_REQUESTED,
            &ReviewRequested {
                owner: "octo-org".into(),
                repo: "gizmo".into(),
                github_id: 3003,
                pr_number: 5,
                user_id: "u2".into(),
            },
        )
        .unwrap();
        f.wf.run(&ev, &ctx(&memo, &ev)).await.unwrap();

        assert_eq!(f.github.comments().await.len(), 1);
        assert!(f.llm.prompts().await[0].contains("pub fn tidy() {}"));
        let rows = f.store.list_reviews("u2").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReviewStatus::Completed);
        assert_eq!(rows[0].pr_title, "Tidy");
    }
}
