use ai_llm_service::AiLlmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use github_gateway::GitHubError;
use pipeline_store::StoreError;
use rag_store::RagError;
use review_pipeline::PipelineError;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::config::ConfigError;
use crate::core::http::response_envelope::ApiResponse;

const GENERIC_FAILURE: &str = "The request could not be completed. Please try again later.";

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("llm setup failed: {0}")]
    Llm(#[from] AiLlmError),

    #[error("github setup failed: {0}")]
    GitHub(#[from] GitHubError),

    #[error("vector index setup failed: {0}")]
    Rag(#[from] RagError),

    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Pipeline(e) => match e {
                PipelineError::Auth(_) => StatusCode::UNAUTHORIZED,
                PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
                PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
                PipelineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::Storage(_) | PipelineError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            // startup-only
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Pipeline(e) => match e {
                PipelineError::Auth(_) => "UNAUTHORIZED",
                PipelineError::NotFound(_) => "NOT_FOUND",
                PipelineError::Validation(_) => "VALIDATION_ERROR",
                PipelineError::Upstream { .. } => "UPSTREAM_ERROR",
                _ => "INTERNAL_ERROR",
            },
            _ => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message; server-side failures stay generic.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(m) | AppError::Unauthorized(m) => m.clone(),
            AppError::Pipeline(PipelineError::Validation(m))
            | AppError::Pipeline(PipelineError::NotFound(m)) => m.clone(),
            AppError::Pipeline(PipelineError::Auth(_)) => {
                "GitHub authorization is missing or expired. Please sign in again.".into()
            }
            _ => GENERIC_FAILURE.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), error = %self, "request failed");
        } else {
            warn!(code = self.error_code(), error = %self, "request rejected");
        }
        ApiResponse::<()>::error(self.error_code(), self.public_message())
            .into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(err: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (PipelineError::Auth("no token".into()), StatusCode::UNAUTHORIZED),
            (PipelineError::NotFound("repo".into()), StatusCode::NOT_FOUND),
            (PipelineError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (PipelineError::upstream("github", "502"), StatusCode::BAD_GATEWAY),
            (PipelineError::Storage("locked".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn server_failures_hide_details() {
        let err = AppError::from(PipelineError::Storage("disk I/O error at /var/db".into()));
        assert_eq!(err.public_message(), GENERIC_FAILURE);

        let err = AppError::from(PipelineError::Validation("API key is required".into()));
        assert_eq!(err.public_message(), "API key is required");
    }
}
