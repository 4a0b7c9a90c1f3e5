//! Per-user LLM API key: format check, live test, storage.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::ports::{LanguageModel, Store};

const MIN_KEY_LEN: usize = 16;
const MAX_KEY_LEN: usize = 256;
const TEST_PROMPT: &str = "Say 'test'";

pub fn validate_api_key_format(key: &str) -> PipelineResult<()> {
    if key.is_empty() {
        return Err(PipelineError::Validation("API key is required".into()));
    }
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len()) {
        return Err(PipelineError::Validation(format!(
            "API key must be {MIN_KEY_LEN}..={MAX_KEY_LEN} characters"
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(PipelineError::Validation(
            "API key must be printable ASCII without whitespace".into(),
        ));
    }
    Ok(())
}

pub struct SettingsService {
    store: Arc<dyn Store>,
    llm: Arc<dyn LanguageModel>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { store, llm }
    }

    /// Validates the format, then issues a one-line generation with the key.
    #[instrument(skip_all)]
    pub async fn test_api_key(&self, key: &str) -> PipelineResult<()> {
        validate_api_key_format(key)?;
        if !self.llm.accepts_api_keys() {
            return Err(PipelineError::Validation(
                "The configured review model does not use API keys.".into(),
            ));
        }
        match self.llm.generate(TEST_PROMPT, Some(key)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(kind = e.kind(), "api key test failed");
                Err(PipelineError::Validation(
                    "Invalid API key. Please check and try again.".into(),
                ))
            }
        }
    }

    #[instrument(skip(self, key))]
    pub async fn save_api_key(&self, user_id: &str, key: &str) -> PipelineResult<()> {
        self.test_api_key(key).await?;
        self.store.save_llm_api_key(user_id, key).await?;
        info!("llm api key saved");
        Ok(())
    }
}
