//! Wiring: capabilities in, a running bus and its services out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::activity::ActivityService;
use crate::bus::EventBus;
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::events::{Event, EventId, GithubSyncRequested, names};
use crate::ingress::WebhookIngress;
use crate::journal::EventJournal;
use crate::model::Review;
use crate::ports::{EventSink, GithubGateway, LanguageModel, Store, VectorIndex};
use crate::repositories::RepositoryService;
use crate::settings::SettingsService;
use crate::step::StepMemo;
use crate::workflows::default_registry;

/// External capabilities every workflow and service draws from.
#[derive(Clone)]
pub struct Capabilities {
    pub store: Arc<dyn Store>,
    pub github: Arc<dyn GithubGateway>,
    pub llm: Arc<dyn LanguageModel>,
    pub vectors: Arc<dyn VectorIndex>,
}

#[derive(Clone)]
pub struct Pipeline {
    pub bus: EventBus,
    pub ingress: Arc<WebhookIngress>,
    pub repositories: Arc<RepositoryService>,
    pub activity: Arc<ActivityService>,
    pub settings: Arc<SettingsService>,
    store: Arc<dyn Store>,
    history_retention: Option<Duration>,
}

impl Pipeline {
    pub fn build(
        caps: Capabilities,
        memo: Arc<dyn StepMemo>,
        journal: Arc<dyn EventJournal>,
        cfg: &PipelineConfig,
    ) -> PipelineResult<Self> {
        let registry = default_registry(&caps, cfg)?;
        info!(workflows = registry.len(), "workflow registry built");

        let bus = EventBus::new(registry, memo, journal, cfg.retry);
        let sink: Arc<dyn EventSink> = Arc::new(bus.clone());

        Ok(Self {
            ingress: Arc::new(WebhookIngress::new(caps.store.clone(), sink.clone())),
            repositories: Arc::new(RepositoryService::new(
                caps.store.clone(),
                caps.github.clone(),
                caps.vectors.clone(),
                sink,
                cfg,
            )),
            activity: Arc::new(ActivityService::new(caps.store.clone(), caps.github.clone())),
            settings: Arc::new(SettingsService::new(caps.store.clone(), caps.llm.clone())),
            store: caps.store,
            history_retention: cfg.history_retention,
            bus,
        })
    }

    /// Queues a background refresh of the user's monthly stats.
    pub async fn request_github_sync(&self, user_id: &str) -> PipelineResult<EventId> {
        let event = Event::typed(
            EventId::random(),
            names::GITHUB_SYNC,
            &GithubSyncRequested {
                user_id: user_id.to_string(),
            },
        )?;
        self.bus.send(event).await
    }

    pub async fn list_reviews(&self, user_id: &str) -> PipelineResult<Vec<Review>> {
        self.store.list_reviews(user_id).await
    }

    /// Resumes journaled work left over from a previous process.
    pub async fn recover(&self) -> PipelineResult<usize> {
        self.bus.recover().await
    }

    pub fn history_retention(&self) -> Option<Duration> {
        self.history_retention
    }

    /// Drops run history older than the configured retention.
    pub async fn prune_history(&self) -> PipelineResult<usize> {
        let Some(retention) = self.history_retention else {
            return Ok(0);
        };
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let pruned = self.bus.prune(cutoff).await?;
        if pruned > 0 {
            info!(events = pruned, "run history pruned");
        }
        Ok(pruned)
    }
}
