use std::sync::Arc;
use std::time::Duration;

use api::core::app_state::AppState;
use api::core::user::USER_ID_HEADER;
use api::routes::router;
use api::routes::webhook::signature::{SIGNATURE_HEADER, sign};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use review_pipeline::journal::EventJournal;
use review_pipeline::memory::{
    MemoryEventJournal, MemoryGithub, MemoryLanguageModel, MemoryStepMemo, MemoryStore,
    MemoryVectorIndex,
};
use review_pipeline::ports::{AuthoredPullRequest, PullRequestDiff, RepositoryFile, Store};
use review_pipeline::{Capabilities, Pipeline, PipelineConfig, RetryPolicy};
use serde_json::{Value, json};
use tower::ServiceExt;

const USER: &str = "u1";
const SECRET: &str = "hook-secret";

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    github: Arc<MemoryGithub>,
    llm: Arc<MemoryLanguageModel>,
    journal: Arc<MemoryEventJournal>,
}

async fn test_app(secret: Option<&str>) -> TestApp {
    let store = Arc::new(MemoryStore::default());
    let github = Arc::new(MemoryGithub::default());
    let llm = Arc::new(MemoryLanguageModel::default());
    let journal = Arc::new(MemoryEventJournal::default());

    store.save_access_token(USER, "tok-1").await.unwrap();
    github.add_token("tok-1", "octo").await;

    let cfg = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        webhook_url: Some("https://reviews.example.com/api/webhooks/github".into()),
        ..PipelineConfig::default()
    };
    let caps = Capabilities {
        store: store.clone(),
        github: github.clone(),
        llm: llm.clone(),
        vectors: Arc::new(MemoryVectorIndex::default()),
    };
    let pipeline = Pipeline::build(
        caps,
        Arc::new(MemoryStepMemo::default()),
        journal.clone(),
        &cfg,
    )
    .unwrap();

    TestApp {
        app: router(AppState::new(pipeline, secret)),
        store,
        github,
        llm,
        journal,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn wait_idle(&self) {
        for _ in 0..500 {
            if self.journal.pending().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline did not settle");
    }
}

fn user_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, USER);
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn webhook_request(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/github")
        .header("content-type", "application/json")
        .header("X-GitHub-Event", event)
        .header("X-GitHub-Delivery", "delivery-1");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn requests_without_a_user_are_rejected() {
    let t = test_app(None).await;
    let req = Request::builder()
        .uri("/api/repositories")
        .body(Body::empty())
        .unwrap();

    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn connect_list_and_disconnect_repository() {
    let t = test_app(None).await;
    t.github
        .add_files(
            "acme",
            "widgets",
            vec![RepositoryFile {
                path: "src/lib.rs".into(),
                content: "pub fn widget() {}".into(),
            }],
        )
        .await;

    let (status, body) = t
        .send(user_request(
            Method::POST,
            "/api/repositories",
            Some(json!({ "githubId": 1001, "owner": "acme", "name": "widgets" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["fullName"], "acme/widgets");
    assert_eq!(body["data"]["url"], "https://github.com/acme/widgets");
    t.wait_idle().await;

    let (status, body) = t
        .send(user_request(
            Method::POST,
            "/api/repositories",
            Some(json!({ "githubId": 1001, "owner": "acme", "name": "widgets" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = t
        .send(user_request(Method::GET, "/api/repositories", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = t
        .send(user_request(Method::DELETE, "/api/repositories/1001", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.github.webhooks("acme", "widgets").await.is_empty());

    let (status, body) = t
        .send(user_request(Method::DELETE, "/api/repositories/1001", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let t = test_app(None).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/repositories")
        .header(USER_ID_HEADER, USER)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = t
        .send(user_request(Method::DELETE, "/api/repositories/abc", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send(user_request(Method::GET, "/api/stats/activity?range=fortnight", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_signature_is_enforced() {
    let t = test_app(Some(SECRET)).await;
    let body = json!({ "zen": "Keep it logically awesome." }).to_string();

    let (status, _) = t.send(webhook_request("ping", &body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = sign("other-secret", body.as_bytes());
    let (status, _) = t.send(webhook_request("ping", &body, forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, res) = t
        .send(webhook_request("ping", &body, sign(SECRET, body.as_bytes())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["message"], "pong");
}

#[tokio::test]
async fn webhook_rejects_missing_event_and_bad_json() {
    let t = test_app(None).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/github")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = t.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.send(webhook_request("push", "{oops", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, res) = t.send(webhook_request("star", "{}", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["message"], "event ignored");
}

#[tokio::test]
async fn pull_request_webhook_produces_a_review() {
    let t = test_app(Some(SECRET)).await;
    t.store
        .create_repository(
            USER,
            review_pipeline::model::NewRepository {
                github_id: 1001,
                owner: "acme".into(),
                name: "widgets".into(),
                full_name: "acme/widgets".into(),
                url: "https://github.com/acme/widgets".into(),
            },
        )
        .await
        .unwrap();
    t.github
        .add_pull_request(
            "acme",
            "widgets",
            PullRequestDiff {
                number: 42,
                title: "Add parser".into(),
                description: None,
                html_url: "https://github.com/acme/widgets/pull/42".into(),
                diff: "+pub fn parse() {}".into(),
            },
        )
        .await;

    let body = json!({
        "action": "opened",
        "number": 42,
        "pull_request": { "number": 42, "title": "Add parser" },
        "repository": { "id": 1001, "full_name": "acme/widgets" }
    })
    .to_string();
    let (status, res) = t
        .send(webhook_request(
            "pull_request",
            &body,
            sign(SECRET, body.as_bytes()),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(res["data"]["eventId"].is_string());
    assert!(res["data"]["reviewEventId"].is_string());
    t.wait_idle().await;

    let (status, res) = t.send(user_request(Method::GET, "/api/reviews", None)).await;
    assert_eq!(status, StatusCode::OK);
    let reviews = res["data"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["prNumber"], 42);
    assert_eq!(reviews[0]["status"], "completed");
    assert_eq!(t.github.comments().await.len(), 1);
}

#[tokio::test]
async fn github_sync_is_queued() {
    let t = test_app(None).await;
    t.github
        .set_activity(
            vec![],
            vec![AuthoredPullRequest {
                created_at: Utc::now(),
                title: "Add cache".into(),
                url: "https://github.com/acme/widgets/pull/1".into(),
            }],
            vec![],
        )
        .await;

    let (status, res) = t
        .send(user_request(Method::POST, "/api/github/sync", None))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(res["data"]["queued"], true);
    t.wait_idle().await;

    let (status, res) = t
        .send(user_request(Method::GET, "/api/stats/monthly", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = res["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["totalPRs"], 1);
}

#[tokio::test]
async fn llm_key_is_tested_before_saving() {
    let t = test_app(None).await;
    t.llm.reject_key("sk-revoked-0123456789").await;

    let (status, res) = t
        .send(user_request(
            Method::POST,
            "/api/user/llm-key",
            Some(json!({ "apiKey": "sk-revoked-0123456789" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        res["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid API key")
    );
    assert_eq!(t.store.llm_api_key(USER).await.unwrap(), None);

    let (status, _) = t
        .send(user_request(
            Method::POST,
            "/api/user/llm-key/test",
            Some(json!({ "apiKey": "sk-good-0123456789ab" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.store.llm_api_key(USER).await.unwrap(), None);

    let (status, _) = t
        .send(user_request(
            Method::POST,
            "/api/user/llm-key",
            Some(json!({ "apiKey": "sk-good-0123456789ab" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        t.store.llm_api_key(USER).await.unwrap().as_deref(),
        Some("sk-good-0123456789ab")
    );
}
