//! Crate-wide error hierarchy for github-gateway.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type GitHubResult<T> = Result<T, GitHubError>;

/// Root error type for the github-gateway crate.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// REST / GraphQL call failed.
    #[error(transparent)]
    Provider(#[from] GitHubProviderError),

    /// Configuration problems (bad base URL, unusable token header).
    #[error(transparent)]
    Config(#[from] GitHubConfigError),

    /// Input validation errors (bad owner/repo, empty comment body, etc.).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Provider-level failure, classified by HTTP status where one exists.
#[derive(Debug, Error)]
pub enum GitHubProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403) that is not a rate limit.
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429, or 403 with an exhausted rate-limit budget).
    #[error("rate limited")]
    RateLimited {
        /// Optional `Retry-After` hint in seconds when available.
        retry_after_secs: Option<u64>,
    },

    /// Gateway / server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (non-2xx) not covered by specific variants.
    #[error("http status error: status {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without HTTP status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected/invalid shape of provider response, GraphQL `errors` included.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Configuration and setup errors.
#[derive(Debug, Error)]
pub enum GitHubConfigError {
    /// Access token cannot be placed in an HTTP header.
    #[error("access token is not a valid header value")]
    InvalidToken,

    /// Invalid base API URL.
    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),
}

impl GitHubProviderError {
    /// Classifies a non-success status. 403 counts as a rate limit when GitHub
    /// reports zero remaining requests.
    pub fn from_status(code: u16, retry_after_secs: Option<u64>, rate_exhausted: bool) -> Self {
        match code {
            401 => GitHubProviderError::Unauthorized,
            403 if rate_exhausted => GitHubProviderError::RateLimited { retry_after_secs },
            403 => GitHubProviderError::Forbidden,
            404 => GitHubProviderError::NotFound,
            429 => GitHubProviderError::RateLimited { retry_after_secs },
            500..=599 => GitHubProviderError::Server(code),
            _ => GitHubProviderError::HttpStatus(code),
        }
    }
}

// ===== Conversions for `?` ergonomics at the crate root =====

impl From<reqwest::Error> for GitHubError {
    fn from(e: reqwest::Error) -> Self {
        GitHubError::Provider(GitHubProviderError::from(e))
    }
}

impl From<reqwest::Error> for GitHubProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return GitHubProviderError::Timeout;
        }

        if let Some(status) = e.status() {
            return GitHubProviderError::from_status(status.as_u16(), None, false);
        }

        if e.is_decode() {
            return GitHubProviderError::InvalidResponse(e.to_string());
        }

        GitHubProviderError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            GitHubProviderError::from_status(401, None, false),
            GitHubProviderError::Unauthorized
        ));
        assert!(matches!(
            GitHubProviderError::from_status(403, None, false),
            GitHubProviderError::Forbidden
        ));
        assert!(matches!(
            GitHubProviderError::from_status(403, Some(30), true),
            GitHubProviderError::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
        assert!(matches!(
            GitHubProviderError::from_status(502, None, false),
            GitHubProviderError::Server(502)
        ));
        assert!(matches!(
            GitHubProviderError::from_status(422, None, false),
            GitHubProviderError::HttpStatus(422)
        ));
    }
}
