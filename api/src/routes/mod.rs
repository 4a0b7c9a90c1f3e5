pub mod repositories;
pub mod reviews;
pub mod settings;
pub mod stats;
pub mod webhook;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::core::app_state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/webhooks/github",
            get(webhook::github_webhook_route::webhook_liveness)
                .post(webhook::github_webhook_route::github_webhook_route),
        )
        .route(
            "/api/repositories",
            get(repositories::repositories_route::list_repositories_route)
                .post(repositories::repositories_route::connect_repository_route),
        )
        .route(
            "/api/repositories/{github_id}",
            delete(repositories::repositories_route::disconnect_repository_route),
        )
        .route("/api/reviews", get(reviews::reviews_route::list_reviews_route))
        .route("/api/github/sync", post(stats::stats_route::github_sync_route))
        .route("/api/stats/activity", get(stats::stats_route::activity_route))
        .route("/api/stats/monthly", get(stats::stats_route::monthly_stats_route))
        .route("/api/user/llm-key", post(settings::llm_key_route::save_llm_key_route))
        .route(
            "/api/user/llm-key/test",
            post(settings::llm_key_route::test_llm_key_route),
        )
        .with_state(state)
}
