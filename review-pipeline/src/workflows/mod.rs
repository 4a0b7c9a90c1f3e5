//! The three registered workflows.

pub mod indexing;
pub mod prompt;
pub mod review;
pub mod stats;

use std::sync::Arc;

pub use indexing::IndexingWorkflow;
pub use review::ReviewWorkflow;
pub use stats::StatsWorkflow;

use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::pipeline::Capabilities;
use crate::workflow::WorkflowRegistry;

/// Registry with `index-repo`, `generate-review` and `sync-github-stats`.
pub fn default_registry(caps: &Capabilities, cfg: &PipelineConfig) -> PipelineResult<WorkflowRegistry> {
    WorkflowRegistry::new()
        .register(Arc::new(IndexingWorkflow::new(
            caps.store.clone(),
            caps.github.clone(),
            caps.llm.clone(),
            caps.vectors.clone(),
            cfg,
        )))?
        .register(Arc::new(ReviewWorkflow::new(
            caps.store.clone(),
            caps.github.clone(),
            caps.llm.clone(),
            caps.vectors.clone(),
            cfg,
        )))?
        .register(Arc::new(StatsWorkflow::new(
            caps.store.clone(),
            caps.github.clone(),
            cfg,
        )))
}
