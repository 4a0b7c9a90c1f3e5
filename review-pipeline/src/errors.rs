//! Error taxonomy for the pipeline.
//!
//! `is_retryable` is the only input to the bus's retry decision.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or rejected credentials. Fatal; the user has to re-authenticate.
    #[error("auth error: {0}")]
    Auth(String),

    /// Referenced repository / user / record does not exist. Fatal.
    #[error("not found: {0}")]
    NotFound(String),

    /// GitHub, LLM or vector index call failed (network, rate limit, 5xx).
    #[error("upstream error from {service}: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// Malformed input at a boundary. Surfaced to the caller, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Relational store or step memo failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A memoized step output could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Upstream { .. } | PipelineError::Storage(_)
        )
    }

    /// Short machine-readable kind, used in logs and outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Auth(_) => "auth",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Upstream { .. } => "upstream",
            PipelineError::Validation(_) => "validation",
            PipelineError::Storage(_) => "storage",
            PipelineError::Serialization(_) => "serialization",
        }
    }
}
