//! GitHub gateway: REST v3 + GraphQL v4 calls the review pipeline consumes.
//!
//! Every call takes the acting user's access token explicitly; the client
//! itself holds no credentials.

mod client;
pub mod contents;
pub mod errors;
mod pulls;
pub mod stats;
pub mod types;
pub mod webhooks;

pub use client::{GitHubClient, GitHubConfig};
pub use errors::{GitHubConfigError, GitHubError, GitHubProviderError, GitHubResult};
pub use types::*;
