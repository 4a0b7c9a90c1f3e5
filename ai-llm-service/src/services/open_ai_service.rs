//! Client for OpenAI-compatible endpoints (OpenAI, Gemini's `/openai` surface).
//!
//! The HTTP client carries no credentials. Every request is authorized with
//! either the caller's key or the key from the profile, so one client serves
//! the server key and all per-user keys alike.

use std::time::{Duration, Instant};

use reqwest::header;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
    },
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

fn provider_err(kind: ProviderErrorKind) -> AiLlmError {
    ProviderError::new(Provider::OpenAI, kind).into()
}

impl OpenAiService {
    /// Checks the provider and the endpoint scheme, then builds the client.
    ///
    /// A missing key is not an error here; it surfaces on the first request
    /// that has no per-call key either.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::OpenAI {
            return Err(provider_err(ProviderErrorKind::InvalidProvider));
        }

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(provider_err(ProviderErrorKind::InvalidEndpoint(
                cfg.endpoint.clone(),
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .default_headers(headers)
            .build()?;

        let base = endpoint.trim_end_matches('/');
        let url_chat = format!("{base}/chat/completions");
        let url_embeddings = format!("{base}/embeddings");

        debug!(model = %cfg.model, endpoint = %cfg.endpoint, "openai client ready");
        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    /// Non-streaming chat completion. `api_key` overrides the profile key.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<String, AiLlmError> {
        let body = ChatCompletionRequest::from_cfg(&self.cfg, prompt, system);
        let out: ChatCompletionResponse = self
            .post_json(&self.url_chat, &body, api_key, "choices[0].message.content")
            .await?;

        out.choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| provider_err(ProviderErrorKind::EmptyChoices))
    }

    /// One embedding vector for `input`, using the profile key.
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input,
        };
        let out: EmbeddingsResponse = self
            .post_json(&self.url_embeddings, &body, None, "data[0].embedding")
            .await?;

        out.data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| {
                provider_err(ProviderErrorKind::Decode(
                    "empty `data` in embeddings response".into(),
                ))
            })
    }

    async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        api_key: Option<&str>,
        expected: &'static str,
    ) -> Result<R, AiLlmError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let key = api_key
            .or(self.cfg.api_key.as_deref())
            .ok_or_else(|| provider_err(ProviderErrorKind::MissingApiKey))?;

        let started = Instant::now();
        let resp = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let snippet = make_snippet(&resp.text().await.unwrap_or_default());
            error!(
                %status,
                %url,
                %snippet,
                model = %self.cfg.model,
                latency_ms = started.elapsed().as_millis(),
                "openai request failed"
            );
            return Err(provider_err(ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            })));
        }

        let out = resp.json::<R>().await.map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "{e}; expected `{expected}`"
            )))
        })?;
        debug!(
            %url,
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "openai request completed"
        );
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str, system: Option<&'a str>) -> Self {
        let messages = system
            .map(|content| ChatMessage {
                role: "system",
                content,
            })
            .into_iter()
            .chain(std::iter::once(ChatMessage {
                role: "user",
                content: prompt,
            }))
            .collect();

        Self {
            model: &cfg.model,
            messages,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "gemini-2.5-flash".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/openai/".into(),
            api_key: Some("test-key-0123456789".into()),
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: Some(10),
        }
    }

    #[test]
    fn derives_versioned_urls() {
        let svc = OpenAiService::new(cfg()).unwrap();
        assert_eq!(
            svc.url_chat,
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
        assert!(svc.url_embeddings.ends_with("/openai/embeddings"));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let mut c = cfg();
        c.endpoint = "ftp://models.example".into();
        assert!(OpenAiService::new(c).is_err());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let mut c = cfg();
        c.api_key = None;
        let svc = OpenAiService::new(c).unwrap();
        let err = svc.generate("hi", None, None).await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn chat_body_puts_system_first() {
        let c = cfg();
        let body = ChatCompletionRequest::from_cfg(&c, "diff here", Some("you review code"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "diff here");
        assert!(json.get("max_tokens").is_none());
    }
}
