//! Connecting and disconnecting repositories.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{Event, EventId, RepositoryConnected, names};
use crate::model::{NewRepository, Repository};
use crate::ports::{EventSink, GithubGateway, Store, VectorIndex, require_access_token};

pub struct RepositoryService {
    store: Arc<dyn Store>,
    github: Arc<dyn GithubGateway>,
    vectors: Arc<dyn VectorIndex>,
    sink: Arc<dyn EventSink>,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
}

impl RepositoryService {
    pub fn new(
        store: Arc<dyn Store>,
        github: Arc<dyn GithubGateway>,
        vectors: Arc<dyn VectorIndex>,
        sink: Arc<dyn EventSink>,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            github,
            vectors,
            sink,
            webhook_url: cfg.webhook_url.clone(),
            webhook_secret: cfg.webhook_secret.clone(),
        }
    }

    /// Persists the repository, registers the webhook (best effort) and
    /// emits `repository.connected` so indexing starts.
    #[instrument(skip(self, repo), fields(repository = %repo.full_name, github_id = repo.github_id))]
    pub async fn connect(&self, user_id: &str, repo: NewRepository) -> PipelineResult<Repository> {
        let token = require_access_token(self.store.as_ref(), user_id).await?;

        if self
            .store
            .find_repository_by_github_id(repo.github_id)
            .await?
            .is_some()
        {
            return Err(PipelineError::Validation(format!(
                "repository {} is already connected",
                repo.full_name
            )));
        }

        let mut created = self.store.create_repository(user_id, repo).await?;

        if let Some(hook_id) = self.register_webhook(&token, &created).await {
            self.store
                .set_repository_webhook(created.id, Some(hook_id))
                .await?;
            created.webhook_id = Some(hook_id);
        }

        let payload = RepositoryConnected {
            owner: created.owner.clone(),
            repo: created.name.clone(),
            user_id: user_id.to_string(),
        };
        self.sink
            .send(Event::typed(
                EventId::random(),
                names::REPOSITORY_CONNECTED,
                &payload,
            )?)
            .await?;

        info!(repository_id = created.id, "repository connected");
        Ok(created)
    }

    /// Reuses a hook already pointing at our URL, otherwise creates one.
    async fn register_webhook(&self, token: &str, repo: &Repository) -> Option<i64> {
        let url = self.webhook_url.as_deref()?;

        match self.github.list_webhooks(token, &repo.owner, &repo.name).await {
            Ok(hooks) => {
                if let Some(existing) = hooks.iter().find(|h| h.url.as_deref() == Some(url)) {
                    return i64::try_from(existing.id).ok();
                }
            }
            Err(e) => warn!(error = %e, "listing webhooks failed"),
        }

        match self
            .github
            .create_webhook(
                token,
                &repo.owner,
                &repo.name,
                url,
                self.webhook_secret.as_deref(),
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "webhook registration failed; repository stays connected");
                None
            }
        }
    }

    /// Removes the user's repository together with its webhook and index entries.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: &str, github_id: i64) -> PipelineResult<()> {
        let repo = self
            .store
            .find_repository_by_github_id(github_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| PipelineError::NotFound(format!("repository {github_id}")))?;

        if let Some(hook_id) = repo.webhook_id {
            match self.store.access_token(user_id).await? {
                Some(token) => {
                    if let Err(e) = self
                        .github
                        .delete_webhook(&token, &repo.owner, &repo.name, hook_id)
                        .await
                    {
                        warn!(hook_id, error = %e, "webhook deletion failed");
                    }
                }
                None => warn!(hook_id, "no access token; webhook left in place"),
            }
        }

        if let Err(e) = self.vectors.delete_namespace(&repo.namespace()).await {
            warn!(namespace = %repo.namespace(), error = %e, "vector purge failed");
        }

        self.store.delete_repository(repo.id).await?;
        info!(repository = %repo.full_name, "repository disconnected");
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> PipelineResult<Vec<Repository>> {
        self.store.list_repositories(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGithub, MemoryStore, MemoryVectorIndex, RecordingSink};
    use crate::ports::IndexedChunk;

    struct Fixture {
        service: RepositoryService,
        store: Arc<MemoryStore>,
        github: Arc<MemoryGithub>,
        vectors: Arc<MemoryVectorIndex>,
        sink: Arc<RecordingSink>,
    }

    async fn fixture(webhook_url: Option<&str>) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        store.save_access_token("u1", "tok-1").await.unwrap();
        let github = Arc::new(MemoryGithub::default());
        github.add_token("tok-1", "octo").await;
        let vectors = Arc::new(MemoryVectorIndex::default());
        let sink = Arc::new(RecordingSink::default());
        let cfg = PipelineConfig {
            webhook_url: webhook_url.map(str::to_string),
            webhook_secret: Some("s3cret".into()),
            ..PipelineConfig::default()
        };
        let service = RepositoryService::new(
            store.clone(),
            github.clone(),
            vectors.clone(),
            sink.clone(),
            &cfg,
        );
        Fixture {
            service,
            store,
            github,
            vectors,
            sink,
        }
    }

    fn widgets() -> NewRepository {
        NewRepository {
            github_id: 1001,
            owner: "acme".into(),
            name: "widgets".into(),
            full_name: "acme/widgets".into(),
            url: "https://github.com/acme/widgets".into(),
        }
    }

    #[tokio::test]
    async fn connect_registers_hook_and_emits_event() {
        let f = fixture(Some("https://hooks.example.com/api/webhooks/github")).await;
        let repo = f.service.connect("u1", widgets()).await.unwrap();

        assert_eq!(repo.webhook_id, Some(1));
        assert_eq!(f.github.webhooks("acme", "widgets").await.len(), 1);
        let events = f.sink.named(names::REPOSITORY_CONNECTED).await;
        assert_eq!(events.len(), 1);
        let p: RepositoryConnected = events[0].payload().unwrap();
        assert_eq!((p.owner.as_str(), p.repo.as_str()), ("acme", "widgets"));
    }

    #[tokio::test]
    async fn existing_hook_is_reused() {
        let url = "https://hooks.example.com/api/webhooks/github";
        let f = fixture(Some(url)).await;
        f.github
            .create_webhook("tok-1", "acme", "widgets", url, None)
            .await
            .unwrap();

        let repo = f.service.connect("u1", widgets()).await.unwrap();
        assert_eq!(repo.webhook_id, Some(1));
        assert_eq!(f.github.webhooks("acme", "widgets").await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_connect_is_rejected() {
        let f = fixture(None).await;
        f.service.connect("u1", widgets()).await.unwrap();
        let err = f.service.connect("u1", widgets()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn connect_without_token_is_auth_error() {
        let f = fixture(None).await;
        let err = f.service.connect("stranger", widgets()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Auth(_)));
        assert!(f.store.list_repositories("stranger").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_cleans_up_and_is_owner_scoped() {
        let f = fixture(Some("https://hooks.example.com/api/webhooks/github")).await;
        f.service.connect("u1", widgets()).await.unwrap();
        f.vectors
            .upsert(vec![IndexedChunk {
                id: "acme/widgets-src_lib_rs".into(),
                namespace: "acme/widgets".into(),
                path: "src/lib.rs".into(),
                content: "File: src/lib.rs".into(),
                vector: vec![1.0, 0.0],
            }])
            .await
            .unwrap();

        let err = f.service.disconnect("u2", 1001).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        f.service.disconnect("u1", 1001).await.unwrap();
        assert!(f.service.list("u1").await.unwrap().is_empty());
        assert!(f.github.webhooks("acme", "widgets").await.is_empty());
        assert_eq!(f.vectors.len().await, 0);
    }
}
