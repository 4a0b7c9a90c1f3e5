use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::Response,
};
use review_pipeline::model::NewRepository;
use serde_json::json;
use tracing::instrument;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse, user::CurrentUser},
    error_handler::AppResult,
    routes::repositories::connect_repository_request::ConnectRepositoryRequest,
};

/// `GET /api/repositories`
#[instrument(name = "list_repositories_route", skip(state))]
pub async fn list_repositories_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let repos = state.pipeline.repositories.list(&user).await?;
    Ok(ApiResponse::success(repos).into_response_with_status(StatusCode::OK))
}

/// `POST /api/repositories`: stores the repository and starts indexing.
#[instrument(name = "connect_repository_route", skip(state, body))]
pub async fn connect_repository_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ConnectRepositoryRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    let repo = NewRepository::try_from(body)?;
    let created = state.pipeline.repositories.connect(&user, repo).await?;
    Ok(ApiResponse::success(created).into_response_with_status(StatusCode::CREATED))
}

/// `DELETE /api/repositories/{github_id}`
#[instrument(name = "disconnect_repository_route", skip(state, github_id))]
pub async fn disconnect_repository_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    github_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Response> {
    let Path(github_id) = github_id?;
    state
        .pipeline
        .repositories
        .disconnect(&user, github_id)
        .await?;
    Ok(ApiResponse::success(json!({ "githubId": github_id, "disconnected": true }))
        .into_response_with_status(StatusCode::OK))
}
