//! Connection and collection settings for the code index.

use std::fmt;

use crate::errors::RagError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceKind {
    Cosine,
    Dot,
    Euclid,
}

/// One Qdrant collection holding every repository, split by namespace.
#[derive(Clone)]
pub struct RagConfig {
    /// gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection: String,
    /// Fixed when the collection is first created; later changes are ignored.
    pub distance: DistanceKind,
    /// Points per upsert request.
    pub upsert_batch: usize,
    /// Brute-force search instead of HNSW.
    pub exact_search: bool,
}

impl RagConfig {
    /// Cosine distance, ANN search, 100 points per upsert.
    pub fn new_default(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            qdrant_api_key: None,
            collection: collection.into(),
            distance: DistanceKind::Cosine,
            upsert_batch: 100,
            exact_search: false,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.qdrant_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), RagError> {
        let url = self.qdrant_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RagError::Config(format!(
                "qdrant_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::Config("collection is empty".into()));
        }
        if self.upsert_batch == 0 {
            return Err(RagError::Config("upsert_batch must be > 0".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagConfig")
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &self.qdrant_api_key.as_ref().map(|_| "<redacted>"))
            .field("collection", &self.collection)
            .field("distance", &self.distance)
            .field("upsert_batch", &self.upsert_batch)
            .field("exact_search", &self.exact_search)
            .finish()
    }
}
