//! Durable record of accepted events, used to resume work after a restart.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::errors::PipelineResult;
use crate::events::{Event, EventId};

pub trait EventJournal: Send + Sync {
    /// Records an accepted event. Re-recording a known id is a no-op.
    fn record<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, PipelineResult<()>>;

    /// Marks every run of the event as terminal (completed or abandoned).
    fn complete<'a>(&'a self, id: EventId) -> BoxFuture<'a, PipelineResult<()>>;

    /// Recorded but not completed, oldest first.
    fn pending<'a>(&'a self) -> BoxFuture<'a, PipelineResult<Vec<Event>>>;

    /// Drops events completed before `completed_before` and returns them.
    /// Pending events are never pruned.
    fn prune<'a>(
        &'a self,
        completed_before: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<Event>>>;
}
