use std::sync::Arc;

use futures::future::BoxFuture;
use rag_store::{RagError, RagRecord, RagStore};

use crate::errors::{PipelineError, PipelineResult};
use crate::ports::{IndexedChunk, VectorIndex, VectorMatch};

/// [`VectorIndex`] over Qdrant.
#[derive(Clone)]
pub struct RagAdapter {
    store: Arc<RagStore>,
}

impl RagAdapter {
    pub fn new(store: Arc<RagStore>) -> Self {
        Self { store }
    }
}

fn map_rag_error(err: RagError) -> PipelineError {
    match err {
        RagError::Qdrant(m) => PipelineError::upstream("vector-index", m),
        other => PipelineError::Validation(other.to_string()),
    }
}

impl VectorIndex for RagAdapter {
    fn upsert<'a>(&'a self, chunks: Vec<IndexedChunk>) -> BoxFuture<'a, PipelineResult<usize>> {
        Box::pin(async move {
            let records = chunks
                .into_iter()
                .map(|c| RagRecord {
                    id: c.id,
                    namespace: c.namespace,
                    path: c.path,
                    content: c.content,
                    vector: c.vector,
                })
                .collect();
            self.store.upsert(records).await.map_err(map_rag_error)
        })
    }

    fn query<'a>(
        &'a self,
        vector: Vec<f32>,
        namespace: &'a str,
        top_k: u64,
    ) -> BoxFuture<'a, PipelineResult<Vec<VectorMatch>>> {
        Box::pin(async move {
            let hits = self
                .store
                .query(vector, namespace, top_k)
                .await
                .map_err(map_rag_error)?;
            Ok(hits
                .into_iter()
                .map(|h| VectorMatch {
                    score: h.score,
                    path: h.path,
                    content: h.content,
                })
                .collect())
        })
    }

    fn delete_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(async move {
            self.store
                .delete_namespace(namespace)
                .await
                .map_err(map_rag_error)
        })
    }
}
