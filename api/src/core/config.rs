//! Application configuration, read from environment variables at startup.
//!
//! LLM profiles are read separately by `ai_llm_service::config::default_config`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use github_gateway::GitHubConfig;
use review_pipeline::{PipelineConfig, RetryPolicy};
use thiserror::Error;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE_PATH: &str = "code_data/review_pipeline.sqlite3";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION: &str = "codereview-vector-embeddings";
const DEFAULT_RETENTION_DAYS: u64 = 30;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl fmt::Debug for QdrantSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QdrantSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("collection", &self.collection)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub address: String,
    pub database_path: PathBuf,
    pub github: GitHubConfig,
    pub qdrant: QdrantSettings,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_api = var("GITHUB_API_BASE").unwrap_or_else(|| DEFAULT_GITHUB_API.into());
        let graphql_url = var("GITHUB_GRAPHQL_URL")
            .unwrap_or_else(|| format!("{}/graphql", base_api.trim_end_matches('/')));

        let defaults = PipelineConfig::default();
        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&var, "RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?.max(1),
            base_delay: Duration::from_millis(parse_or(
                &var,
                "RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &var,
                "RETRY_MAX_DELAY_MS",
                retry_defaults.max_delay.as_millis() as u64,
            )?),
        };

        let pipeline = PipelineConfig {
            index_max_chars: parse_or(&var, "INDEX_MAX_CHARS", defaults.index_max_chars)?,
            index_batch_size: positive(&var, "INDEX_BATCH_SIZE", defaults.index_batch_size)?,
            rag_top_k: parse_or(&var, "RAG_TOP_K", defaults.rag_top_k)?,
            review_concurrency: positive(&var, "REVIEW_CONCURRENCY", defaults.review_concurrency)?,
            stats_concurrency: positive(&var, "STATS_CONCURRENCY", defaults.stats_concurrency)?,
            retry,
            webhook_url: var("GITHUB_WEBHOOK_URL"),
            webhook_secret: var("GITHUB_WEBHOOK_SECRET"),
            // 0 keeps run history forever
            history_retention: match parse_or(&var, "RUN_HISTORY_RETENTION_DAYS", DEFAULT_RETENTION_DAYS)? {
                0 => None,
                days => Some(Duration::from_secs(days.saturating_mul(SECS_PER_DAY))),
            },
        };

        Ok(Self {
            address: var("API_ADDRESS").unwrap_or_else(|| DEFAULT_ADDRESS.into()),
            database_path: var("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.into())
                .into(),
            github: GitHubConfig {
                base_api,
                graphql_url,
            },
            qdrant: QdrantSettings {
                url: var("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.into()),
                api_key: var("QDRANT_API_KEY"),
                collection: var("QDRANT_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.into()),
            },
            pipeline,
        })
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.pipeline.webhook_secret.as_deref()
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            var: name,
            reason: format!("cannot parse '{}'", raw.trim()),
        }),
    }
}

fn positive<F>(var: &F, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(var, name, default)? {
        0 => Err(ConfigError::Invalid {
            var: name,
            reason: "must be greater than zero".into(),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.address, "0.0.0.0:8080");
        assert_eq!(cfg.database_path, PathBuf::from("code_data/review_pipeline.sqlite3"));
        assert_eq!(cfg.github.graphql_url, "https://api.github.com/graphql");
        assert_eq!(cfg.qdrant.collection, "codereview-vector-embeddings");
        assert_eq!(cfg.pipeline.review_concurrency, 5);
        assert_eq!(cfg.pipeline.stats_concurrency, 2);
        assert_eq!(cfg.pipeline.retry.max_attempts, 4);
        assert_eq!(cfg.pipeline.index_max_chars, 8000);
        assert_eq!(
            cfg.pipeline.history_retention,
            Some(Duration::from_secs(30 * SECS_PER_DAY))
        );
        assert_eq!(cfg.webhook_secret(), None);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("GITHUB_API_BASE", "https://ghe.example.com/api/v3/"),
            ("REVIEW_CONCURRENCY", "8"),
            ("RETRY_BASE_DELAY_MS", "250"),
            ("GITHUB_WEBHOOK_SECRET", "s3cret"),
            ("QDRANT_API_KEY", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.github.graphql_url, "https://ghe.example.com/api/v3/graphql");
        assert_eq!(cfg.pipeline.review_concurrency, 8);
        assert_eq!(cfg.pipeline.retry.base_delay, Duration::from_millis(250));
        assert_eq!(cfg.webhook_secret(), Some("s3cret"));
        assert_eq!(cfg.qdrant.api_key, None);

        let keep_all = config(&[("RUN_HISTORY_RETENTION_DAYS", "0")]).unwrap();
        assert_eq!(keep_all.pipeline.history_retention, None);
        let week = config(&[("RUN_HISTORY_RETENTION_DAYS", "7")]).unwrap();
        assert_eq!(
            week.pipeline.history_retention,
            Some(Duration::from_secs(7 * SECS_PER_DAY))
        );
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = config(&[("STATS_CONCURRENCY", "two")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "STATS_CONCURRENCY", .. }));

        let err = config(&[("REVIEW_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "REVIEW_CONCURRENCY", .. }));
    }
}
