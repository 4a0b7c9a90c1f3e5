//! In-process backends for tests and local runs.
//!
//! Scripted GitHub and language-model fakes live in [`fakes`] and are only
//! compiled for tests or with the `test-support` feature.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, EventId};
use crate::journal::EventJournal;
use crate::model::{MonthlyStat, NewRepository, NewReview, Repository, Review};
use crate::ports::{IndexedChunk, Store, VectorIndex, VectorMatch};
use crate::step::{RunId, StepMemo};

#[cfg(any(test, feature = "test-support"))]
pub mod fakes;
#[cfg(any(test, feature = "test-support"))]
pub use fakes::{
    EMBEDDING_DIM, MemoryGithub, MemoryLanguageModel, RecordedComment, RecordingSink,
    histogram_embedding,
};

/* ------------------------------- step memo ------------------------------- */

#[derive(Default)]
pub struct MemoryStepMemo {
    entries: Mutex<HashMap<(RunId, String), Value>>,
}

impl MemoryStepMemo {
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl StepMemo for MemoryStepMemo {
    fn load<'a>(
        &'a self,
        run: &'a RunId,
        step: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Option<Value>>> {
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .await
                .get(&(run.clone(), step.to_string()))
                .cloned())
        })
    }

    fn save<'a>(
        &'a self,
        run: &'a RunId,
        step: &'a str,
        output: Value,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.entries
                .lock()
                .await
                .entry((run.clone(), step.to_string()))
                .or_insert(output);
            Ok(())
        })
    }

    fn forget<'a>(&'a self, runs: &'a [RunId]) -> BoxFuture<'a, PipelineResult<usize>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let before = entries.len();
            entries.retain(|(run, _), _| !runs.contains(run));
            Ok(before - entries.len())
        })
    }
}

/* ----------------------------- event journal ----------------------------- */

#[derive(Default)]
pub struct MemoryEventJournal {
    /// Event and its completion time.
    entries: Mutex<Vec<(Event, Option<DateTime<Utc>>)>>,
}

impl EventJournal for MemoryEventJournal {
    fn record<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            if !entries.iter().any(|(e, _)| e.id == event.id) {
                entries.push((event.clone(), None));
            }
            Ok(())
        })
    }

    fn complete<'a>(&'a self, id: EventId) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            for (e, done) in self.entries.lock().await.iter_mut() {
                if e.id == id && done.is_none() {
                    *done = Some(Utc::now());
                }
            }
            Ok(())
        })
    }

    fn pending<'a>(&'a self) -> BoxFuture<'a, PipelineResult<Vec<Event>>> {
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .await
                .iter()
                .filter(|(_, done)| done.is_none())
                .map(|(e, _)| e.clone())
                .collect())
        })
    }

    fn prune<'a>(
        &'a self,
        completed_before: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<Event>>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let (old, kept): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|(_, done)| done.is_some_and(|at| at < completed_before));
            *entries = kept;
            Ok(old.into_iter().map(|(e, _)| e).collect())
        })
    }
}

/* ------------------------------ vector index ----------------------------- */

/// Brute-force cosine similarity over an ordered map.
#[derive(Default)]
pub struct MemoryVectorIndex {
    chunks: RwLock<BTreeMap<String, IndexedChunk>>,
}

impl MemoryVectorIndex {
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.chunks.read().await.keys().cloned().collect()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

impl VectorIndex for MemoryVectorIndex {
    fn upsert<'a>(&'a self, chunks: Vec<IndexedChunk>) -> BoxFuture<'a, PipelineResult<usize>> {
        Box::pin(async move {
            let n = chunks.len();
            let mut map = self.chunks.write().await;
            for c in chunks {
                map.insert(c.id.clone(), c);
            }
            Ok(n)
        })
    }

    fn query<'a>(
        &'a self,
        vector: Vec<f32>,
        namespace: &'a str,
        top_k: u64,
    ) -> BoxFuture<'a, PipelineResult<Vec<VectorMatch>>> {
        Box::pin(async move {
            let map = self.chunks.read().await;
            let mut hits: Vec<VectorMatch> = map
                .values()
                .filter(|c| c.namespace == namespace)
                .map(|c| VectorMatch {
                    score: cosine(&vector, &c.vector),
                    path: c.path.clone(),
                    content: c.content.clone(),
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(usize::try_from(top_k).unwrap_or(usize::MAX));
            Ok(hits)
        })
    }

    fn delete_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.chunks
                .write()
                .await
                .retain(|_, c| c.namespace != namespace);
            Ok(())
        })
    }
}

/* --------------------------------- store --------------------------------- */

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    tokens: HashMap<String, String>,
    llm_keys: HashMap<String, String>,
    repositories: Vec<Repository>,
    reviews: Vec<Review>,
    stats: BTreeMap<(String, String), MonthlyStat>,
    next_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    /// Every review row regardless of owner.
    pub async fn all_reviews(&self) -> Vec<Review> {
        self.state.read().await.reviews.clone()
    }
}

impl Store for MemoryStore {
    fn access_token<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>> {
        Box::pin(async move { Ok(self.state.read().await.tokens.get(user_id).cloned()) })
    }

    fn save_access_token<'a>(
        &'a self,
        user_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .tokens
                .insert(user_id.to_string(), token.to_string());
            Ok(())
        })
    }

    fn llm_api_key<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Option<String>>> {
        Box::pin(async move { Ok(self.state.read().await.llm_keys.get(user_id).cloned()) })
    }

    fn save_llm_api_key<'a>(
        &'a self,
        user_id: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .llm_keys
                .insert(user_id.to_string(), key.to_string());
            Ok(())
        })
    }

    fn find_repository_by_github_id<'a>(
        &'a self,
        github_id: i64,
    ) -> BoxFuture<'a, PipelineResult<Option<Repository>>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .repositories
                .iter()
                .find(|r| r.github_id == github_id)
                .cloned())
        })
    }

    fn list_repositories<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<Repository>>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .repositories
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn create_repository<'a>(
        &'a self,
        user_id: &'a str,
        repo: NewRepository,
    ) -> BoxFuture<'a, PipelineResult<Repository>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.repositories.iter().any(|r| r.github_id == repo.github_id) {
                return Err(PipelineError::Validation(format!(
                    "repository {} is already connected",
                    repo.github_id
                )));
            }
            let row = Repository {
                id: state.next_id(),
                github_id: repo.github_id,
                owner: repo.owner,
                name: repo.name,
                full_name: repo.full_name,
                url: repo.url,
                user_id: user_id.to_string(),
                webhook_id: None,
                created_at: Utc::now(),
            };
            state.repositories.push(row.clone());
            Ok(row)
        })
    }

    fn set_repository_webhook<'a>(
        &'a self,
        repository_id: i64,
        webhook_id: Option<i64>,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let repo = state
                .repositories
                .iter_mut()
                .find(|r| r.id == repository_id)
                .ok_or_else(|| PipelineError::NotFound(format!("repository {repository_id}")))?;
            repo.webhook_id = webhook_id;
            Ok(())
        })
    }

    fn delete_repository<'a>(&'a self, repository_id: i64) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.repositories.retain(|r| r.id != repository_id);
            state.reviews.retain(|r| r.repository_id != repository_id);
            Ok(())
        })
    }

    fn create_review<'a>(&'a self, review: NewReview) -> BoxFuture<'a, PipelineResult<Review>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let row = Review {
                id: state.next_id(),
                repository_id: review.repository_id,
                pr_number: review.pr_number,
                pr_title: review.pr_title,
                pr_url: review.pr_url,
                review: review.review,
                status: review.status,
                created_at: Utc::now(),
            };
            state.reviews.push(row.clone());
            Ok(row)
        })
    }

    fn list_reviews<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, PipelineResult<Vec<Review>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut out: Vec<Review> = state
                .reviews
                .iter()
                .filter(|rv| {
                    state
                        .repositories
                        .iter()
                        .any(|r| r.id == rv.repository_id && r.user_id == user_id)
                })
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(out)
        })
    }

    fn upsert_monthly_stat<'a>(&'a self, stat: MonthlyStat) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .stats
                .insert((stat.user_id.clone(), stat.month.clone()), stat);
            Ok(())
        })
    }

    fn monthly_stats<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Vec<MonthlyStat>>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .stats
                .values()
                .rev()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, ns: &str, v: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.into(),
            namespace: ns.into(),
            path: id.into(),
            content: format!("File: {id}"),
            vector: v,
        }
    }

    #[tokio::test]
    async fn vector_query_is_namespaced_and_ranked() {
        let idx = MemoryVectorIndex::default();
        idx.upsert(vec![
            chunk("a", "acme/widgets", vec![1.0, 0.0]),
            chunk("b", "acme/widgets", vec![0.7, 0.7]),
            chunk("c", "other/repo", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

        let hits = idx.query(vec![1.0, 0.0], "acme/widgets", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "a");

        idx.delete_namespace("acme/widgets").await.unwrap();
        assert_eq!(idx.ids().await, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_github_id_is_rejected() {
        let store = MemoryStore::default();
        let new = NewRepository {
            github_id: 99,
            owner: "acme".into(),
            name: "widgets".into(),
            full_name: "acme/widgets".into(),
            url: "https://github.com/acme/widgets".into(),
        };
        store.create_repository("u1", new.clone()).await.unwrap();
        assert!(matches!(
            store.create_repository("u2", new).await,
            Err(PipelineError::Validation(_))
        ));
    }
}
