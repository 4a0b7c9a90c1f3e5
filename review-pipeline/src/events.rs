//! Events flowing through the bus and their typed payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{PipelineError, PipelineResult};

/// Event names.
pub mod names {
    pub const GITHUB_SYNC: &str = "app/github.sync";
    pub const REPOSITORY_CONNECTED: &str = "repository.connected";
    pub const PR_REVIEW_REQUESTED: &str = "pr.review.requested";

    /// Forwarded raw webhook, e.g. `github/pull_request`.
    pub fn github(kind: &str) -> String {
        format!("github/{kind}")
    }
}

/// Identity of an emitted event. Redeliveries carry the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id derived from an external identity (e.g. a webhook delivery GUID).
    pub fn from_seed(seed: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An immutable, named payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub data: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self::with_id(EventId::random(), name, data)
    }

    pub fn with_id(id: EventId, name: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            name: name.into(),
            data,
            occurred_at: Utc::now(),
        }
    }

    /// Typed event built from a payload struct.
    pub fn typed<T: Serialize>(id: EventId, name: &str, payload: &T) -> PipelineResult<Self> {
        Ok(Self::with_id(id, name, serde_json::to_value(payload)?))
    }

    /// Decodes `data`; a malformed payload is a validation error, never retried.
    pub fn payload<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            PipelineError::Validation(format!("malformed '{}' payload: {e}", self.name))
        })
    }
}

/// `repository.connected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConnected {
    pub owner: String,
    pub repo: String,
    pub user_id: String,
}

/// `pr.review.requested`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequested {
    /// Current name on GitHub, as carried by the hook.
    pub owner: String,
    pub repo: String,
    /// Stable across renames; resolves the connected record.
    pub github_id: i64,
    pub pr_number: u64,
    pub user_id: String,
}

/// `app/github.sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubSyncRequested {
    pub user_id: String,
}
