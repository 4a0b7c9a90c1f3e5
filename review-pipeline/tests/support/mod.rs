#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use review_pipeline::journal::EventJournal;
use review_pipeline::memory::{
    MemoryEventJournal, MemoryGithub, MemoryLanguageModel, MemoryStepMemo, MemoryStore,
    MemoryVectorIndex,
};
use review_pipeline::model::{NewRepository, Repository};
use review_pipeline::ports::{PullRequestDiff, Store};
use review_pipeline::{Capabilities, Pipeline, PipelineConfig, RetryPolicy};
use serde_json::{Value, json};

pub const USER: &str = "u1";
pub const TOKEN: &str = "tok-1";
pub const GITHUB_ID: i64 = 1001;
pub const HOOK_URL: &str = "https://reviews.example.com/api/webhooks/github";

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub github: Arc<MemoryGithub>,
    pub llm: Arc<MemoryLanguageModel>,
    pub vectors: Arc<MemoryVectorIndex>,
    pub memo: Arc<MemoryStepMemo>,
    pub journal: Arc<MemoryEventJournal>,
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        },
        webhook_url: Some(HOOK_URL.into()),
        ..PipelineConfig::default()
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(MemoryLanguageModel::default(), Arc::new(MemoryEventJournal::default())).await
    }

    pub async fn build(llm: MemoryLanguageModel, journal: Arc<MemoryEventJournal>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let github = Arc::new(MemoryGithub::default());
        let llm = Arc::new(llm);
        let vectors = Arc::new(MemoryVectorIndex::default());
        let memo = Arc::new(MemoryStepMemo::default());

        store.save_access_token(USER, TOKEN).await.unwrap();
        github.add_token(TOKEN, "octo").await;

        let caps = Capabilities {
            store: store.clone(),
            github: github.clone(),
            llm: llm.clone(),
            vectors: vectors.clone(),
        };
        let pipeline = Pipeline::build(caps, memo.clone(), journal.clone(), &test_config()).unwrap();

        Self {
            pipeline,
            store,
            github,
            llm,
            vectors,
            memo,
            journal,
        }
    }

    /// Connects `acme/widgets` straight through the store, without indexing.
    pub async fn seed_repository(&self) -> Repository {
        self.store
            .create_repository(USER, widgets())
            .await
            .unwrap()
    }

    pub async fn add_pull_request(&self, number: u64, title: &str) {
        self.github
            .add_pull_request(
                "acme",
                "widgets",
                PullRequestDiff {
                    number,
                    title: title.into(),
                    description: Some("Adds a parser.".into()),
                    html_url: format!("https://github.com/acme/widgets/pull/{number}"),
                    diff: "+pub fn parse() {}".into(),
                },
            )
            .await;
    }

    /// Waits until every journaled event has reached a terminal state.
    pub async fn wait_idle(&self) {
        for _ in 0..500 {
            if self.journal.pending().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline did not settle");
    }
}

pub fn widgets() -> NewRepository {
    NewRepository {
        github_id: GITHUB_ID,
        owner: "acme".into(),
        name: "widgets".into(),
        full_name: "acme/widgets".into(),
        url: "https://github.com/acme/widgets".into(),
    }
}

pub fn pull_request_hook(action: &str, number: u64, repository_id: i64) -> Value {
    json!({
        "action": action,
        "number": number,
        "pull_request": { "number": number, "title": "Add parser" },
        "repository": { "id": repository_id, "full_name": "acme/widgets" }
    })
}
