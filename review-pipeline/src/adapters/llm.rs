use std::sync::Arc;

use ai_llm_service::{AiLlmError, LlmServiceProfiles};
use futures::future::BoxFuture;

use crate::errors::{PipelineError, PipelineResult};
use crate::ports::LanguageModel;

const REVIEW_SYSTEM: &str = "You are a meticulous senior engineer reviewing pull requests.";

/// [`LanguageModel`] over the shared review/embedding profiles.
#[derive(Clone)]
pub struct LlmAdapter {
    profiles: Arc<LlmServiceProfiles>,
}

impl LlmAdapter {
    pub fn new(profiles: Arc<LlmServiceProfiles>) -> Self {
        Self { profiles }
    }
}

fn map_llm_error(err: AiLlmError) -> PipelineError {
    if err.is_auth_failure() {
        PipelineError::Auth(err.to_string())
    } else {
        PipelineError::upstream("llm", err.to_string())
    }
}

impl LanguageModel for LlmAdapter {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        api_key: Option<&'a str>,
    ) -> BoxFuture<'a, PipelineResult<String>> {
        Box::pin(async move {
            self.profiles
                .generate(prompt, Some(REVIEW_SYSTEM), api_key)
                .await
                .map_err(map_llm_error)
        })
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, PipelineResult<Vec<f32>>> {
        Box::pin(async move { self.profiles.embed(text).await.map_err(map_llm_error) })
    }

    fn accepts_api_keys(&self) -> bool {
        self.profiles.review_accepts_api_key()
    }
}
