use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use review_pipeline::ingress::IngressOutcome;
use serde::Serialize;
use serde_json::Value;
use tracing::{Span, info, instrument, warn};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::webhook::signature::{self, SIGNATURE_HEADER},
};

const EVENT_HEADER: &str = "X-GitHub-Event";
const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_event_id: Option<String>,
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `GET /api/webhooks/github`
pub async fn webhook_liveness() -> Response {
    ApiResponse::success(WebhookResponse {
        message: "GitHub webhook endpoint is live",
        event_id: None,
        review_event_id: None,
    })
    .into_response_with_status(StatusCode::OK)
}

/// `POST /api/webhooks/github`
///
/// Verifies the signature when a secret is configured, then hands the
/// delivery to the ingress. Unknown event types are acknowledged with `200`.
#[instrument(
    name = "github_webhook_route",
    skip(state, headers, body),
    fields(event = tracing::field::Empty, delivery = tracing::field::Empty)
)]
pub async fn github_webhook_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let event_type = header(&headers, EVENT_HEADER)
        .ok_or_else(|| AppError::BadRequest(format!("missing {EVENT_HEADER} header")))?;
    let delivery = header(&headers, DELIVERY_HEADER);
    Span::current().record("event", event_type);
    if let Some(d) = delivery {
        Span::current().record("delivery", d);
    }

    if let Some(secret) = state.webhook_secret.as_deref() {
        if !signature::verify(secret, &body, header(&headers, SIGNATURE_HEADER)) {
            warn!("webhook signature mismatch");
            return Err(AppError::Unauthorized("invalid webhook signature".into()));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed webhook payload: {e}")))?;

    let outcome = state
        .pipeline
        .ingress
        .handle(event_type, delivery, payload)
        .await?;

    let response = match outcome {
        IngressOutcome::Pong => WebhookResponse {
            message: "pong",
            event_id: None,
            review_event_id: None,
        },
        IngressOutcome::Ignored => WebhookResponse {
            message: "event ignored",
            event_id: None,
            review_event_id: None,
        },
        IngressOutcome::Forwarded {
            event_id,
            review_requested,
        } => {
            info!(review = review_requested.is_some(), "webhook accepted");
            WebhookResponse {
                message: "event accepted",
                event_id: Some(event_id.to_string()),
                review_event_id: review_requested.map(|id| id.to_string()),
            }
        }
    };

    Ok(ApiResponse::success(response).into_response_with_status(StatusCode::OK))
}
