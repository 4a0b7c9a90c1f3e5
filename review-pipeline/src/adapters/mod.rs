//! Port implementations over the production clients.

pub mod github;
pub mod llm;
pub mod rag;

pub use github::GitHubAdapter;
pub use llm::LlmAdapter;
pub use rag::RagAdapter;
