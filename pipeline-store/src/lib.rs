//! SQLite persistence for the review pipeline.
//!
//! One [`SqliteStore`] implements the relational [`Store`], the durable
//! [`StepMemo`] and the [`EventJournal`]. The connection sits behind a mutex
//! and every call runs on the blocking pool.
//!
//! [`Store`]: review_pipeline::ports::Store
//! [`StepMemo`]: review_pipeline::step::StepMemo
//! [`EventJournal`]: review_pipeline::journal::EventJournal

pub mod errors;
mod journal;
mod records;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use review_pipeline::PipelineResult;
use rusqlite::Connection;
use tracing::info;

pub use errors::{StoreError, StoreResult};

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating parent directories) and migrates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "sqlite store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?;
        Ok(joined?)
    }
}
