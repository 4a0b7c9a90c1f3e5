use axum::{extract::State, http::StatusCode, response::Response};
use tracing::instrument;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse, user::CurrentUser},
    error_handler::AppResult,
};

/// `GET /api/reviews`: the user's review history, newest first.
#[instrument(name = "list_reviews_route", skip(state))]
pub async fn list_reviews_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let reviews = state.pipeline.list_reviews(&user).await?;
    Ok(ApiResponse::success(reviews).into_response_with_status(StatusCode::OK))
}
