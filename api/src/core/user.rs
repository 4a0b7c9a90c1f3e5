use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error_handler::AppError;

/// Header set by the session layer in front of the API.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The acting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or_else(|| AppError::Unauthorized("missing user session".into()))
    }
}
