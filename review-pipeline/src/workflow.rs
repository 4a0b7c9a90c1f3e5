//! Workflow contract and the startup-built registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::{PipelineError, PipelineResult};
use crate::events::Event;
use crate::step::StepContext;

pub trait Workflow: Send + Sync {
    /// Stable id; part of every run identity.
    fn id(&self) -> &'static str;

    /// Event name that starts a run.
    fn trigger(&self) -> &'static str;

    /// Maximum concurrently executing runs, `None` for unbounded.
    fn concurrency(&self) -> Option<usize> {
        None
    }

    fn run<'a>(&'a self, event: &'a Event, ctx: &'a StepContext)
    -> BoxFuture<'a, PipelineResult<Value>>;

    /// Called once when a run fails terminally. `ctx` belongs to the last
    /// attempt and can recall outputs of the steps that did complete.
    fn on_failure<'a>(
        &'a self,
        _event: &'a Event,
        _ctx: &'a StepContext,
        _error: &'a PipelineError,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Event name → workflows, in registration order.
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    by_trigger: HashMap<&'static str, Vec<Arc<dyn Workflow>>>,
    ids: HashSet<&'static str>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a workflow; ids must be unique.
    pub fn register(mut self, workflow: Arc<dyn Workflow>) -> PipelineResult<Self> {
        if !self.ids.insert(workflow.id()) {
            return Err(PipelineError::Validation(format!(
                "workflow '{}' registered twice",
                workflow.id()
            )));
        }
        self.by_trigger
            .entry(workflow.trigger())
            .or_default()
            .push(workflow);
        Ok(self)
    }

    pub fn workflows_for(&self, event_name: &str) -> &[Arc<dyn Workflow>] {
        self.by_trigger
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Workflow>> {
        self.by_trigger.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
