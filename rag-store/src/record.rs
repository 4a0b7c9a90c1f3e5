//! Core data models used by the library.

use serde::{Deserialize, Serialize};

/// Payload key holding the namespace every query is filtered on.
pub const NAMESPACE_FIELD: &str = "repo_id";
pub const PATH_FIELD: &str = "path";
pub const CONTENT_FIELD: &str = "content";

/// One vector plus the payload stored next to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagRecord {
    /// Caller-level id; mapped to a stable UUID point id.
    pub id: String,
    pub namespace: String,
    pub path: String,
    pub content: String,
    pub vector: Vec<f32>,
}

/// A single retrieval hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagHit {
    pub score: f32,
    pub namespace: String,
    pub path: String,
    pub content: String,
}
