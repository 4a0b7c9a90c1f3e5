use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use ai_llm_service::config::default_config::{config_embedding, config_review};
use github_gateway::GitHubClient;
use pipeline_store::SqliteStore;
use rag_store::{RagConfig, RagStore};
use review_pipeline::adapters::{GitHubAdapter, LlmAdapter, RagAdapter};
use review_pipeline::{Capabilities, Pipeline};
use tracing::info;

use crate::core::config::AppConfig;
use crate::error_handler::AppError;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// HMAC secret for `X-Hub-Signature-256`; `None` disables verification.
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, webhook_secret: Option<&str>) -> Self {
        Self {
            pipeline,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }

    /// Wires SQLite, GitHub, Qdrant and the LLM profiles into a pipeline.
    pub fn build(cfg: &AppConfig) -> Result<Self, AppError> {
        let store = Arc::new(SqliteStore::open(&cfg.database_path)?);

        let github = GitHubClient::new(cfg.github.clone())?;
        let profiles = LlmServiceProfiles::new(config_review()?, config_embedding()?);

        let rag_cfg = RagConfig::new_default(&cfg.qdrant.url, &cfg.qdrant.collection)
            .with_api_key(cfg.qdrant.api_key.clone());
        let rag = RagStore::new(rag_cfg)?;

        let caps = Capabilities {
            store: store.clone(),
            github: Arc::new(GitHubAdapter::new(Arc::new(github))),
            llm: Arc::new(LlmAdapter::new(Arc::new(profiles))),
            vectors: Arc::new(RagAdapter::new(Arc::new(rag))),
        };
        let pipeline = Pipeline::build(caps, store.clone(), store, &cfg.pipeline)?;

        info!(
            database = %cfg.database_path.display(),
            collection = %cfg.qdrant.collection,
            webhook_verification = cfg.webhook_secret().is_some(),
            "application state ready"
        );
        Ok(Self::new(pipeline, cfg.webhook_secret()))
    }
}
