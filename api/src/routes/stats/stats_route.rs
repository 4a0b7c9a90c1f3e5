use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::Response,
};
use review_pipeline::activity::StatsRange;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse, user::CurrentUser},
    error_handler::AppResult,
};

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub range: Option<String>,
}

/// `POST /api/github/sync`: queues a background stats refresh.
#[instrument(name = "github_sync_route", skip(state))]
pub async fn github_sync_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let event_id = state.pipeline.request_github_sync(&user).await?;
    info!(%event_id, "github sync queued");
    Ok(
        ApiResponse::success(json!({ "queued": true, "eventId": event_id.to_string() }))
            .into_response_with_status(StatusCode::ACCEPTED),
    )
}

/// `GET /api/stats/activity?range=today|week|all|<months>`
#[instrument(name = "activity_route", skip(state, query))]
pub async fn activity_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query?;
    let range = match query.range.as_deref().map(str::trim) {
        None | Some("") => StatsRange::default(),
        Some(raw) => StatsRange::parse(raw)?,
    };
    let buckets = state.pipeline.activity.activity(&user, range).await?;
    Ok(ApiResponse::success(buckets).into_response_with_status(StatusCode::OK))
}

/// `GET /api/stats/monthly`
#[instrument(name = "monthly_stats_route", skip(state))]
pub async fn monthly_stats_route(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let stats = state.pipeline.activity.monthly_stats(&user).await?;
    Ok(ApiResponse::success(stats).into_response_with_status(StatusCode::OK))
}
