use serde::Deserialize;

/// Body of the `llm-key` endpoints. `Debug` is not derived so the key
/// cannot end up in logs.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmKeyRequest {
    pub api_key: String,
}
