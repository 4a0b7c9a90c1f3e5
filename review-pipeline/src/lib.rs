//! Event-driven pull request review pipeline.
//!
//! Webhooks and API calls emit [`events::Event`]s onto the [`bus::EventBus`];
//! workflows subscribed to them run as sequences of memoized steps, retried
//! with backoff on transient failures and bounded per workflow.

pub mod activity;
pub mod adapters;
pub mod bus;
pub mod config;
pub mod errors;
pub mod events;
pub mod ingress;
pub mod journal;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod repositories;
pub mod retry;
pub mod settings;
pub mod step;
pub mod workflow;
pub mod workflows;

pub use bus::{EventBus, RunOutcome, RunStatus};
pub use config::PipelineConfig;
pub use errors::{PipelineError, PipelineResult};
pub use events::{Event, EventId};
pub use pipeline::{Capabilities, Pipeline};
pub use retry::RetryPolicy;
