pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;

pub use error_handler::{AiLlmError, Result};
pub use service_profiles::LlmServiceProfiles;
