//! `index-repo`: embeds every file of a freshly connected repository.
//!
//! Each file becomes one document, `"File: {path}\n\n{content}"`, head-truncated
//! to `index_max_chars`. Large files lose their tail. Chunk ids are derived from
//! the namespace and the sanitized path, so re-indexing overwrites in place.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::events::{Event, RepositoryConnected, names};
use crate::ports::{
    GithubGateway, IndexedChunk, LanguageModel, RepositoryFile, Store, VectorIndex,
    require_access_token,
};
use crate::step::StepContext;
use crate::workflow::Workflow;

const EMBED_CONCURRENCY: usize = 4;

/// A file left out of the index; the rest of the repository is still indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub indexed_files: usize,
    pub batches: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Replaces everything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_path(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn chunk_id(namespace: &str, path: &str) -> String {
    format!("{namespace}-{}", sanitize_path(path))
}

/// `"File: {path}\n\n{content}"` cut to at most `max_chars` chars.
pub fn build_document(path: &str, content: &str, max_chars: usize) -> String {
    let doc = format!("File: {path}\n\n{content}");
    match doc.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => doc[..byte_idx].to_string(),
        None => doc,
    }
}

pub struct IndexingWorkflow {
    store: Arc<dyn Store>,
    github: Arc<dyn GithubGateway>,
    llm: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    max_chars: usize,
    batch_size: usize,
}

impl IndexingWorkflow {
    pub const ID: &'static str = "index-repo";

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
            max_chars: cfg.index_max_chars,
            batch_size: cfg.index_batch_size.max(1),
        }
    }

    /// Embeds and upserts `files` under `namespace`.
    ///
    /// A file whose embedding fails is skipped. A failing upsert batch aborts
    /// the remaining batches and surfaces the error.
    pub async fn index_files(
        &self,
        namespace: &str,
        files: &[RepositoryFile],
    ) -> PipelineResult<IndexReport> {
        let embedded: Vec<(&RepositoryFile, String, PipelineResult<Vec<f32>>)> =
            stream::iter(
                files
                    .iter()
                    .map(|file| async move {
                        let doc = build_document(&file.path, &file.content, self.max_chars);
                        let vector = self.llm.embed(&doc).await;
                        (file, doc, vector)
                    })
                    .collect::<Vec<_>>(),
            )
                .buffered(EMBED_CONCURRENCY)
                .collect()
                .await;

        let mut chunks = Vec::with_capacity(embedded.len());
        let mut skipped = Vec::new();
        for (file, doc, vector) in embedded {
            match vector {
                Ok(vector) => chunks.push(IndexedChunk {
                    id: chunk_id(namespace, &file.path),
                    namespace: namespace.to_string(),
                    path: file.path.clone(),
                    content: doc,
                    vector,
                }),
                Err(e) => {
                    warn!(path = %file.path, error = %e, "embedding failed; file skipped");
                    skipped.push(SkippedFile {
                        path: file.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let indexed_files = chunks.len();
        let mut batches = 0;
        let mut pending = chunks.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<IndexedChunk> = pending.by_ref().take(self.batch_size).collect();
            let n = self.vectors.upsert(batch).await?;
            batches += 1;
            debug!(batch = batches, chunks = n, "batch upserted");
        }

        Ok(IndexReport {
            indexed_files,
            batches,
            skipped,
        })
    }
}

impl Workflow for IndexingWorkflow {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn trigger(&self) -> &'static str {
        names::REPOSITORY_CONNECTED
    }

    fn run<'a>(
        &'a self,
        event: &'a Event,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, PipelineResult<Value>> {
        Box::pin(async move {
            let RepositoryConnected {
                owner,
                repo,
                user_id,
            } = event.payload()?;
            let namespace = format!("{owner}/{repo}");

            let token = require_access_token(self.store.as_ref(), &user_id).await?;

            let files: Vec<RepositoryFile> = ctx
                .run("fetch-files", || {
                    self.github.repository_files(&token, &owner, &repo)
                })
                .await?;

            let report: IndexReport = ctx
                .run("index-codebase", || self.index_files(&namespace, &files))
                .await?;

            info!(
                %namespace,
                indexed = report.indexed_files,
                skipped = report.skipped.len(),
                batches = report.batches,
                "repository indexed"
            );
            Ok(json!({
                "success": true,
                "indexedFiles": report.indexed_files,
                "skippedFiles": report.skipped,
            }))
        })
    }
}
