//! Memoized steps.
//!
//! A step body runs at most once per `(run, step name)`: the first successful
//! output is recorded in the [`StepMemo`] and every later call replays it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::errors::PipelineResult;
use crate::events::EventId;

/// `"{workflowId}:{eventId}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(String);

impl RunId {
    pub fn new(workflow_id: &str, event_id: EventId) -> Self {
        Self(format!("{workflow_id}:{event_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Completed step outputs keyed by `(run, step)`.
pub trait StepMemo: Send + Sync {
    fn load<'a>(&'a self, run: &'a RunId, step: &'a str)
    -> BoxFuture<'a, PipelineResult<Option<Value>>>;

    /// Records `output`; an existing record for the same key is kept.
    fn save<'a>(
        &'a self,
        run: &'a RunId,
        step: &'a str,
        output: Value,
    ) -> BoxFuture<'a, PipelineResult<()>>;

    /// Drops every step of the given runs; returns the number of rows removed.
    fn forget<'a>(&'a self, runs: &'a [RunId]) -> BoxFuture<'a, PipelineResult<usize>>;
}

/// Per-attempt handle a workflow runs its steps through.
pub struct StepContext {
    run_id: RunId,
    attempt: u32,
    memo: Arc<dyn StepMemo>,
}

impl StepContext {
    pub fn new(run_id: RunId, attempt: u32, memo: Arc<dyn StepMemo>) -> Self {
        Self {
            run_id,
            attempt,
            memo,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Memoized output of `name` without executing anything.
    pub async fn recall<T: DeserializeOwned>(&self, name: &str) -> PipelineResult<Option<T>> {
        match self.memo.load(&self.run_id, name).await? {
            Some(saved) => Ok(Some(serde_json::from_value(saved)?)),
            None => Ok(None),
        }
    }

    /// Replays the memoized output of `name`, or executes `body` and records it.
    ///
    /// A failing body records nothing, so the next attempt executes it again.
    pub async fn run<T, F, Fut>(&self, name: &str, body: F) -> PipelineResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        if let Some(saved) = self.memo.load(&self.run_id, name).await? {
            debug!(run_id = %self.run_id, step = name, "step replayed from memo");
            return Ok(serde_json::from_value(saved)?);
        }

        let started = Instant::now();
        let output = body().await?;
        self.memo
            .save(&self.run_id, name, serde_json::to_value(&output)?)
            .await?;

        debug!(
            run_id = %self.run_id,
            step = name,
            attempt = self.attempt,
            latency_ms = started.elapsed().as_millis(),
            "step completed"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::memory::MemoryStepMemo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(memo: &Arc<MemoryStepMemo>) -> StepContext {
        let id = EventId::from_seed("evt-1");
        StepContext::new(RunId::new("wf", id), 1, memo.clone())
    }

    #[tokio::test]
    async fn body_runs_once_and_replays() {
        let memo = Arc::new(MemoryStepMemo::default());
        let calls = AtomicUsize::new(0);

        let body = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, PipelineError>(vec!["a".to_string(), "b".to_string()])
        };
        let first: Vec<String> = ctx(&memo).run("fetch", body).await.unwrap();
        let second: Vec<String> = ctx(&memo)
            .run("fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["changed".to_string()])
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_body_is_not_recorded() {
        let memo = Arc::new(MemoryStepMemo::default());
        let c = ctx(&memo);
        let err = c
            .run::<u32, _, _>("flaky", || async {
                Err(PipelineError::upstream("llm", "503"))
            })
            .await;
        assert!(err.is_err());

        let ok: u32 = c.run("flaky", || async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn recall_reads_without_running() {
        let memo = Arc::new(MemoryStepMemo::default());
        let c = ctx(&memo);
        assert_eq!(c.recall::<String>("title").await.unwrap(), None);

        let _: String = c.run("title", || async { Ok("Add caching".to_string()) }).await.unwrap();
        let later = StepContext::new(c.run_id().clone(), 2, memo.clone());
        assert_eq!(
            later.recall::<String>("title").await.unwrap().as_deref(),
            Some("Add caching")
        );
    }

    #[test]
    fn run_id_format() {
        let id = EventId::from_seed("x");
        assert_eq!(
            RunId::new("generate-review", id).as_str(),
            format!("generate-review:{id}")
        );
    }
}
