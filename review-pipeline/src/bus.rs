//! In-process event bus.
//!
//! - `send` journals the event and dispatches it on a spawned task.
//! - Each `(workflow, event)` pair is one run; a per-run lock serializes
//!   redeliveries so a step body cannot execute twice concurrently.
//! - Admission control: one semaphore per workflow with a declared limit. The
//!   permit is held for a single attempt and released during backoff.
//! - Retryable failures re-enter the workflow with a fresh context over the
//!   same memo, so completed steps replay instead of re-running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::errors::PipelineResult;
use crate::events::{Event, EventId};
use crate::journal::EventJournal;
use crate::ports::EventSink;
use crate::retry::RetryPolicy;
use crate::step::{RunId, StepContext, StepMemo};
use crate::workflow::{Workflow, WorkflowRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed(Value),
    Failed { kind: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub workflow_id: &'static str,
    pub run_id: RunId,
    pub attempts: u32,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed(_))
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.status {
            RunStatus::Completed(v) => Some(v),
            RunStatus::Failed { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    registry: WorkflowRegistry,
    memo: Arc<dyn StepMemo>,
    journal: Arc<dyn EventJournal>,
    retry: RetryPolicy,
    limits: HashMap<&'static str, Arc<Semaphore>>,
    run_locks: Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventBus {
    pub fn new(
        registry: WorkflowRegistry,
        memo: Arc<dyn StepMemo>,
        journal: Arc<dyn EventJournal>,
        retry: RetryPolicy,
    ) -> Self {
        let limits = registry
            .all()
            .filter_map(|wf| {
                wf.concurrency()
                    .map(|n| (wf.id(), Arc::new(Semaphore::new(n.max(1)))))
            })
            .collect();

        Self {
            inner: Arc::new(BusInner {
                registry,
                memo,
                journal,
                retry,
                limits,
                run_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Journals the event and dispatches it in the background.
    pub async fn send(&self, event: Event) -> PipelineResult<EventId> {
        let id = event.id;
        if self.inner.registry.workflows_for(&event.name).is_empty() {
            debug!(event = %event.name, event_id = %id, "no workflow registered; event accepted");
            return Ok(id);
        }

        self.inner.journal.record(&event).await?;
        debug!(event = %event.name, event_id = %id, "event journaled");

        let bus = self.clone();
        tokio::spawn(async move {
            bus.dispatch(event).await;
        });
        Ok(id)
    }

    /// Runs every workflow registered for the event to a terminal state.
    pub async fn dispatch(&self, event: Event) -> Vec<RunOutcome> {
        let workflows = self.inner.registry.workflows_for(&event.name);
        let outcomes = join_all(workflows.iter().map(|wf| self.execute(wf.clone(), &event))).await;

        if !outcomes.is_empty() {
            if let Err(e) = self.inner.journal.complete(event.id).await {
                warn!(event_id = %event.id, error = %e, "failed to mark event complete");
            }
        }
        outcomes
    }

    /// Re-dispatches events accepted before a restart but never completed.
    pub async fn recover(&self) -> PipelineResult<usize> {
        let pending = self.inner.journal.pending().await?;
        let n = pending.len();
        for event in pending {
            info!(event = %event.name, event_id = %event.id, "resuming journaled event");
            let bus = self.clone();
            tokio::spawn(async move {
                bus.dispatch(event).await;
            });
        }
        Ok(n)
    }

    /// Forgets events completed before `completed_before` together with the
    /// memoized steps of their runs. Returns the number of events pruned.
    pub async fn prune(&self, completed_before: DateTime<Utc>) -> PipelineResult<usize> {
        let events = self.inner.journal.prune(completed_before).await?;
        let runs: Vec<RunId> = events
            .iter()
            .flat_map(|e| {
                self.inner
                    .registry
                    .workflows_for(&e.name)
                    .iter()
                    .map(|wf| RunId::new(wf.id(), e.id))
            })
            .collect();
        let steps = self.inner.memo.forget(&runs).await?;
        debug!(events = events.len(), steps, "run history pruned");
        Ok(events.len())
    }

    async fn execute(&self, wf: Arc<dyn Workflow>, event: &Event) -> RunOutcome {
        let run_id = RunId::new(wf.id(), event.id);
        let span = info_span!("workflow_run", workflow = wf.id(), run_id = %run_id);

        let outcome = async {
            let lock = self.run_lock(&run_id);
            let guard = lock.lock().await;
            let outcome = self.attempt_loop(&wf, event, &run_id).await;
            drop(guard);
            drop(lock);
            self.release_run_lock(&run_id);
            outcome
        }
        .instrument(span)
        .await;

        RunOutcome {
            workflow_id: wf.id(),
            run_id,
            attempts: outcome.0,
            status: outcome.1,
        }
    }

    async fn attempt_loop(
        &self,
        wf: &Arc<dyn Workflow>,
        event: &Event,
        run_id: &RunId,
    ) -> (u32, RunStatus) {
        let retry = self.inner.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let ctx = StepContext::new(run_id.clone(), attempt, self.inner.memo.clone());

            let permit = self.admit(wf.id()).await;
            let result = wf.run(event, &ctx).await;
            drop(permit);

            match result {
                Ok(output) => {
                    info!(attempt, "workflow run completed");
                    return (attempt, RunStatus::Completed(output));
                }
                Err(e) if retry.should_retry(attempt, &e) => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms = delay.as_millis(),
                        "workflow run failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, kind = e.kind(), error = %e, "workflow run failed terminally");
                    wf.on_failure(event, &ctx, &e).await;
                    return (
                        attempt,
                        RunStatus::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
    }

    async fn admit(&self, workflow_id: &str) -> Option<OwnedSemaphorePermit> {
        let sem = self.inner.limits.get(workflow_id)?.clone();
        sem.acquire_owned().await.ok()
    }

    fn run_lock(&self, run_id: &RunId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .run_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(run_id.clone()).or_default().clone()
    }

    fn release_run_lock(&self, run_id: &RunId) {
        let mut locks = self
            .inner
            .run_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks.get(run_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(run_id);
        }
    }
}

impl EventSink for EventBus {
    fn send<'a>(&'a self, event: Event) -> BoxFuture<'a, PipelineResult<EventId>> {
        Box::pin(EventBus::send(self, event))
    }
}
