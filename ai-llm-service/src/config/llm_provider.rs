/// Represents the provider (backend) used for large language model (LLM) inference.
///
/// `OpenAI` covers every endpoint speaking the OpenAI chat-completions and
/// embeddings protocol, including Gemini's OpenAI-compatible surface
/// (`https://generativelanguage.googleapis.com/v1beta/openai`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI-compatible REST API.
    OpenAI,
}

impl LlmProvider {
    /// Parses the `LLM_KIND` value (`ollama`, `openai`, `gemini`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "gemini" | "chatgpt" => Some(Self::OpenAI),
            _ => None,
        }
    }

    /// Ollama runs unauthenticated.
    pub fn takes_api_key(self) -> bool {
        matches!(self, Self::OpenAI)
    }
}
