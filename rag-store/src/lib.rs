//! Namespaced vector index over Qdrant.
//!
//! - Upserts are batched and keyed by a stable UUID derived from the caller's
//!   id, so re-indexing overwrites instead of duplicating.
//! - The collection is created lazily on the first upsert, sized by the first
//!   vector seen.
//! - Every query and purge is filtered by namespace.

mod config;
mod errors;
mod filters;
mod qdrant_facade;
mod record;

pub use config::{DistanceKind, RagConfig};
pub use errors::RagError;
pub use record::{CONTENT_FIELD, NAMESPACE_FIELD, PATH_FIELD, RagHit, RagRecord};

use std::collections::HashMap;

use qdrant_client::qdrant::{PointStruct, Value as QValue};
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// High-level facade that wires configuration and Qdrant client.
///
/// This is the single entry point recommended for application code.
pub struct RagStore {
    cfg: RagConfig,
    client: qdrant_facade::QdrantFacade,
    /// Vector size the collection was created (or found) with.
    ready: OnceCell<usize>,
}

impl RagStore {
    /// Constructs a new store from the given configuration.
    ///
    /// # Errors
    /// Returns `RagError::Config` / `RagError::Qdrant` if client initialization fails.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        trace!("RagStore::new collection={}", cfg.collection);
        let client = qdrant_facade::QdrantFacade::new(&cfg)?;
        Ok(Self {
            cfg,
            client,
            ready: OnceCell::new(),
        })
    }

    /// Upserts records in batches of `upsert_batch`. A failing batch aborts
    /// the remaining ones.
    ///
    /// Returns the number of records written.
    pub async fn upsert(&self, records: Vec<RagRecord>) -> Result<usize, RagError> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let dim = first.vector.len();
        for r in &records {
            if r.namespace.trim().is_empty() {
                return Err(RagError::EmptyNamespace);
            }
            if r.vector.len() != dim {
                return Err(RagError::VectorSizeMismatch {
                    got: r.vector.len(),
                    want: dim,
                });
            }
        }

        let want = *self
            .ready
            .get_or_try_init(|| async {
                self.client.ensure_collection(dim).await?;
                Ok::<_, RagError>(dim)
            })
            .await?;
        if want != dim {
            return Err(RagError::VectorSizeMismatch { got: dim, want });
        }

        let total = records.len();
        let mut written = 0usize;
        let mut points = records.into_iter().map(to_point).peekable();
        let mut batch_no = 0usize;
        while points.peek().is_some() {
            let batch: Vec<PointStruct> = points.by_ref().take(self.cfg.upsert_batch).collect();
            batch_no += 1;
            written += self.client.upsert_points(batch).await?;
            debug!(batch = batch_no, written, total, "upsert batch stored");
        }

        info!(collection = %self.cfg.collection, written, "upsert completed");
        Ok(written)
    }

    /// Top-`top_k` hits inside `namespace`. A collection that was never
    /// created yields no hits.
    pub async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: u64,
    ) -> Result<Vec<RagHit>, RagError> {
        let filter = filters::namespace_filter(namespace)?;
        if self.ready.get().is_none() && !self.client.collection_exists().await? {
            debug!(namespace, "collection missing; no context");
            return Ok(Vec::new());
        }

        let hits = self
            .client
            .search(vector, top_k, filter, self.cfg.exact_search)
            .await?;

        Ok(hits
            .into_iter()
            .map(|(score, payload)| payload_to_hit(score, &payload))
            .collect())
    }

    /// Removes every point of `namespace`.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<(), RagError> {
        let filter = filters::namespace_filter(namespace)?;
        if self.ready.get().is_none() && !self.client.collection_exists().await? {
            return Ok(());
        }
        self.client.delete_by_filter(filter).await?;
        info!(namespace, "namespace purged");
        Ok(())
    }
}

/// Stable point id: UUIDv5 over the caller's id.
pub fn point_id(id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes()).to_string()
}

fn to_point(r: RagRecord) -> PointStruct {
    let mut payload: HashMap<&str, QValue> = HashMap::with_capacity(4);
    payload.insert(NAMESPACE_FIELD, QValue::from(r.namespace));
    payload.insert(PATH_FIELD, QValue::from(r.path));
    payload.insert(CONTENT_FIELD, QValue::from(r.content));
    payload.insert("chunk_id", QValue::from(r.id.clone()));
    PointStruct::new(point_id(&r.id), r.vector, payload)
}

fn payload_to_hit(score: f32, payload: &serde_json::Value) -> RagHit {
    let field = |k: &str| {
        payload
            .get(k)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    RagHit {
        score,
        namespace: field(NAMESPACE_FIELD),
        path: field(PATH_FIELD),
        content: field(CONTENT_FIELD),
    }
}
