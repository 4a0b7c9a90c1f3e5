use review_pipeline::PipelineError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    Missing(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("blocking task failed: {0}")]
    Join(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(m) => PipelineError::Validation(m),
            StoreError::Missing(m) => PipelineError::NotFound(m),
            StoreError::Json(e) => PipelineError::Serialization(e),
            other => PipelineError::Storage(other.to_string()),
        }
    }
}

/// Maps a UNIQUE/PRIMARY KEY violation onto [`StoreError::Conflict`].
pub(crate) fn conflict_or(err: rusqlite::Error, message: impl FnOnce() -> String) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message())
        }
        other => StoreError::Sqlite(other),
    }
}
