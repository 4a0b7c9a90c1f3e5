use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
};
use serde_json::json;
use tracing::instrument;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse, user::CurrentUser},
    error_handler::AppResult,
    routes::settings::llm_key_request::LlmKeyRequest,
};

/// `POST /api/user/llm-key`: validates, tests and stores the key.
#[instrument(name = "save_llm_key_route", skip(state, body))]
pub async fn save_llm_key_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<LlmKeyRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    state
        .pipeline
        .settings
        .save_api_key(&user, body.api_key.trim())
        .await?;
    Ok(ApiResponse::success(json!({ "saved": true })).into_response_with_status(StatusCode::OK))
}

/// `POST /api/user/llm-key/test`: validates and tests without storing.
#[instrument(name = "test_llm_key_route", skip(state, body))]
pub async fn test_llm_key_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<LlmKeyRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    state.pipeline.settings.test_api_key(body.api_key.trim()).await?;
    Ok(ApiResponse::success(json!({ "valid": true })).into_response_with_status(StatusCode::OK))
}
