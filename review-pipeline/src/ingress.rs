//! Webhook ingress: classifies inbound GitHub deliveries into bus events.
//!
//! - `ping` is acknowledged and nothing is emitted.
//! - `push`, `pull_request`, `pull_request_review` and
//!   `pull_request_review_comment` are forwarded verbatim as `github/{type}`.
//! - A `pull_request` with action `opened`, `synchronize` or `reopened` on a
//!   connected repository additionally emits `pr.review.requested`.
//!
//! Event ids are seeded from the `X-GitHub-Delivery` GUID, so a redelivery
//! maps onto the runs of the first delivery.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, EventId, ReviewRequested, names};
use crate::ports::{EventSink, Store};

const FORWARDED: [&str; 4] = [
    "push",
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
];

const REVIEW_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Pong,
    Forwarded {
        event_id: EventId,
        review_requested: Option<EventId>,
    },
    Ignored,
}

/// Fields of a `pull_request` delivery the pipeline reads.
#[derive(Debug, Deserialize)]
struct PullRequestHook {
    action: String,
    number: u64,
    repository: HookRepository,
}

#[derive(Debug, Deserialize)]
struct HookRepository {
    id: i64,
    full_name: String,
}

pub struct WebhookIngress {
    store: Arc<dyn Store>,
    sink: Arc<dyn EventSink>,
}

impl WebhookIngress {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    #[instrument(skip(self, payload, delivery_id))]
    pub async fn handle(
        &self,
        event_type: &str,
        delivery_id: Option<&str>,
        payload: Value,
    ) -> PipelineResult<IngressOutcome> {
        if event_type == "ping" {
            debug!("ping acknowledged");
            return Ok(IngressOutcome::Pong);
        }
        if !FORWARDED.contains(&event_type) {
            debug!("unhandled event type ignored");
            return Ok(IngressOutcome::Ignored);
        }

        let pr = if event_type == "pull_request" {
            Some(parse_pull_request(&payload)?)
        } else {
            None
        };

        let name = names::github(event_type);
        let forwarded = Event::with_id(event_id(delivery_id, &name), name, payload);
        let event_id = self.sink.send(forwarded).await?;

        let review_requested = match pr {
            Some(pr) if REVIEW_ACTIONS.contains(&pr.action.as_str()) => {
                self.request_review(pr, delivery_id).await?
            }
            _ => None,
        };

        Ok(IngressOutcome::Forwarded {
            event_id,
            review_requested,
        })
    }

    async fn request_review(
        &self,
        pr: PullRequestHook,
        delivery_id: Option<&str>,
    ) -> PipelineResult<Option<EventId>> {
        let (owner, repo) = split_full_name(&pr.repository.full_name)?;

        let Some(repository) = self
            .store
            .find_repository_by_github_id(pr.repository.id)
            .await?
        else {
            warn!(
                repository = %pr.repository.full_name,
                pr_number = pr.number,
                "repository not connected; review skipped"
            );
            return Ok(None);
        };

        let payload = ReviewRequested {
            owner: owner.to_string(),
            repo: repo.to_string(),
            github_id: repository.github_id,
            pr_number: pr.number,
            user_id: repository.user_id,
        };
        let event = Event::typed(
            event_id(delivery_id, names::PR_REVIEW_REQUESTED),
            names::PR_REVIEW_REQUESTED,
            &payload,
        )?;
        let id = self.sink.send(event).await?;
        info!(
            repository = %pr.repository.full_name,
            pr_number = pr.number,
            action = %pr.action,
            "review requested"
        );
        Ok(Some(id))
    }
}

fn event_id(delivery_id: Option<&str>, name: &str) -> EventId {
    match delivery_id.map(str::trim).filter(|d| !d.is_empty()) {
        Some(delivery) => EventId::from_seed(&format!("{delivery}:{name}")),
        None => EventId::random(),
    }
}

fn parse_pull_request(payload: &Value) -> PipelineResult<PullRequestHook> {
    PullRequestHook::deserialize(payload)
        .map_err(|e| PipelineError::Validation(format!("malformed pull_request payload: {e}")))
}

fn split_full_name(full_name: &str) -> PipelineResult<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(PipelineError::Validation(format!(
            "repository.full_name '{full_name}' is not owner/name"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, RecordingSink};
    use crate::model::NewRepository;
    use serde_json::json;

    fn pr_payload(action: &str, github_id: i64, number: u64) -> Value {
        json!({
            "action": action,
            "number": number,
            "pull_request": { "title": "Add caching" },
            "repository": { "id": github_id, "full_name": "acme/widgets" }
        })
    }

    async fn setup(connected: bool) -> (WebhookIngress, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::default());
        if connected {
            store
                .create_repository(
                    "u1",
                    NewRepository {
                        github_id: 1001,
                        owner: "acme".into(),
                        name: "widgets".into(),
                        full_name: "acme/widgets".into(),
                        url: "https://github.com/acme/widgets".into(),
                    },
                )
                .await
                .unwrap();
        }
        let sink = Arc::new(RecordingSink::default());
        (WebhookIngress::new(store, sink.clone()), sink)
    }

    #[tokio::test]
    async fn ping_emits_nothing() {
        let (ingress, sink) = setup(true).await;
        let out = ingress.handle("ping", Some("d-1"), json!({"zen": "hi"})).await.unwrap();
        assert_eq!(out, IngressOutcome::Pong);
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn opened_on_connected_repo_requests_review() {
        let (ingress, sink) = setup(true).await;
        ingress
            .handle("pull_request", Some("d-1"), pr_payload("opened", 1001, 42))
            .await
            .unwrap();

        assert_eq!(sink.named("github/pull_request").await.len(), 1);
        let requested = sink.named(names::PR_REVIEW_REQUESTED).await;
        assert_eq!(requested.len(), 1);
        let p: ReviewRequested = requested[0].payload().unwrap();
        assert_eq!(p.owner, "acme");
        assert_eq!(p.repo, "widgets");
        assert_eq!(p.github_id, 1001);
        assert_eq!(p.pr_number, 42);
        assert_eq!(p.user_id, "u1");
    }

    #[tokio::test]
    async fn unknown_repository_is_dropped() {
        let (ingress, sink) = setup(false).await;
        let out = ingress
            .handle("pull_request", Some("d-1"), pr_payload("opened", 1001, 42))
            .await
            .unwrap();
        assert!(matches!(
            out,
            IngressOutcome::Forwarded {
                review_requested: None,
                ..
            }
        ));
        assert!(sink.named(names::PR_REVIEW_REQUESTED).await.is_empty());
    }

    #[tokio::test]
    async fn other_actions_only_forward() {
        let (ingress, sink) = setup(true).await;
        ingress
            .handle("pull_request", Some("d-2"), pr_payload("closed", 1001, 42))
            .await
            .unwrap();
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn redelivery_reuses_event_ids() {
        let (ingress, _sink) = setup(true).await;
        let a = ingress
            .handle("pull_request", Some("guid-7"), pr_payload("opened", 1001, 7))
            .await
            .unwrap();
        let b = ingress
            .handle("pull_request", Some("guid-7"), pr_payload("opened", 1001, 7))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn malformed_pull_request_is_rejected_before_forwarding() {
        let (ingress, sink) = setup(true).await;
        let err = ingress
            .handle("pull_request", Some("d-3"), json!({"action": "opened"}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_types_are_ignored() {
        let (ingress, sink) = setup(true).await;
        let out = ingress.handle("issues", None, json!({})).await.unwrap();
        assert_eq!(out, IngressOutcome::Ignored);
        assert!(sink.events().await.is_empty());
    }
}
