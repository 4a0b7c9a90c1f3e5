//! Default LLM configs loaded strictly from environment variables.
//!
//! Two roles are used by the review pipeline:
//!
//! - **Review**    → the model that writes pull-request reviews
//! - **Embedding** → the model used to index and query repository content
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND`       = `openai` (default, also `gemini`) or `ollama`
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//!
//! OpenAI-compatible:
//! - `LLM_BASE_URL`    = API base incl. version (default `https://api.openai.com/v1`)
//! - `LLM_API_KEY`     = API key (optional: users may supply their own key)
//! - `LLM_MODEL`       = review model (mandatory)
//! - `EMBEDDING_MODEL` = embedding model (mandatory)
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `LLM_MODEL`, `EMBEDDING_MODEL` as above

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt_u32, must_env, opt_env, validate_http_endpoint,
    },
};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Reads `LLM_KIND`, defaulting to the OpenAI-compatible provider.
pub fn provider_from_env() -> Result<LlmProvider, AiLlmError> {
    match opt_env("LLM_KIND") {
        None => Ok(LlmProvider::OpenAI),
        Some(raw) => LlmProvider::parse(&raw)
            .ok_or_else(|| ConfigError::UnsupportedProvider(raw).into()),
    }
}

/// Resolves the Ollama endpoint strictly from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Some(url) = opt_env("OLLAMA_URL") {
        validate_http_endpoint("OLLAMA_URL", &url)?;
        return Ok(url);
    }
    if let Some(port) = opt_env("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    Err(AiLlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

fn endpoint_and_key(provider: LlmProvider) -> Result<(String, Option<String>), AiLlmError> {
    match provider {
        LlmProvider::Ollama => Ok((ollama_endpoint()?, None)),
        LlmProvider::OpenAI => {
            let base = opt_env("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE.into());
            validate_http_endpoint("LLM_BASE_URL", &base)?;
            Ok((base, opt_env("LLM_API_KEY")))
        }
    }
}

/// Constructs the config for the **review** model.
///
/// # Defaults
/// - `temperature = Some(0.2)`
/// - `timeout_secs = Some(300)` (a review of a large diff is a single blocking call)
pub fn config_review() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env()?;
    let (endpoint, api_key) = endpoint_and_key(provider)?;

    Ok(LlmModelConfig {
        provider,
        model: must_env("LLM_MODEL")?,
        endpoint,
        api_key,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(300),
    })
}

/// Constructs the config for the **embedding** model.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `timeout_secs = Some(30)`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env()?;
    let (endpoint, api_key) = endpoint_and_key(provider)?;

    Ok(LlmModelConfig {
        provider,
        model: must_env("EMBEDDING_MODEL")?,
        endpoint,
        api_key,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}
