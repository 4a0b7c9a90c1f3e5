//! Shared LLM service with two active profiles: `review` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches one HTTP client per profile (provider, endpoint, model, timeout).
//! - A per-call API key override is attached to that single request only and
//!   never cached, so users who stored their own key are billed on it.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::service_profiles::LlmServiceProfiles;
//! use ai_llm_service::config::default_config::{config_embedding, config_review};
//!
//! # async fn demo() -> ai_llm_service::error_handler::Result<()> {
//! let svc = Arc::new(LlmServiceProfiles::new(config_review()?, config_embedding()?));
//! let txt = svc.generate("Say 'test'", None, None).await?;
//! let emb = svc.embed("Ferris").await?;
//! println!("{txt} / dim = {}", emb.len());
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::AiLlmError,
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Shared service that manages the **review** and **embedding** profiles.
///
/// Internally, it caches Ollama/OpenAI clients keyed by their configuration to
/// avoid recreating HTTP clients on each call.
pub struct LlmServiceProfiles {
    review: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmServiceProfiles {
    pub fn new(review: LlmModelConfig, embedding: LlmModelConfig) -> Self {
        Self {
            review,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
        }
    }

    /// Generates text using the **review** profile.
    ///
    /// `api_key_override` replaces the configured key for this call only. It
    /// has no effect on Ollama, which takes no key.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if the client cannot be built or generation fails.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        api_key_override: Option<&str>,
    ) -> Result<String, AiLlmError> {
        match self.review.provider {
            LlmProvider::Ollama => {
                if api_key_override.is_some() {
                    debug!("ollama takes no api key; override ignored");
                }
                let cli = self.get_or_init_ollama(&self.review).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.review).await?;
                cli.generate(prompt, system, api_key_override).await
            }
        }
    }

    /// Computes embeddings using the **embedding** profile.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        match self.embedding.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.embedding).await?;
                cli.embeddings(input).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(&self.embedding).await?;
                cli.embeddings(input).await
            }
        }
    }

    /// Whether `generate` sends `api_key_override` anywhere.
    pub fn review_accepts_api_key(&self) -> bool {
        self.review.provider.takes_api_key()
    }

    /// Returns references to the current profiles `(review, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.review, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn get_or_init_ollama(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OllamaService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key) {
            return Ok(cli.clone());
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        debug!(model = %cfg.model, "ollama client cached");
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key) {
            return Ok(cli.clone());
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        debug!(model = %cfg.model, "openai client cached");
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Cache key for a client. Credentials are deliberately absent.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}
