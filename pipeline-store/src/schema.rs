//! DDL and `user_version`-based migrations.

use rusqlite::Connection;
use tracing::info;

use crate::errors::StoreResult;

pub const SCHEMA_VERSION: i32 = 1;

/// Version 1. Every statement is replay-safe.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        user_id TEXT PRIMARY KEY,
        provider_id TEXT NOT NULL DEFAULT 'github',
        access_token TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS user_settings (
        user_id TEXT PRIMARY KEY,
        llm_api_key TEXT
    );",
    "CREATE TABLE IF NOT EXISTS repositories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        github_id INTEGER NOT NULL UNIQUE,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        full_name TEXT NOT NULL,
        url TEXT NOT NULL,
        user_id TEXT NOT NULL,
        webhook_id INTEGER,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        pr_number INTEGER NOT NULL,
        pr_title TEXT NOT NULL,
        pr_url TEXT NOT NULL,
        review TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS monthly_github_stats (
        user_id TEXT NOT NULL,
        month TEXT NOT NULL,
        year INTEGER NOT NULL,
        total_commits INTEGER NOT NULL,
        total_prs INTEGER NOT NULL,
        total_reviews INTEGER NOT NULL,
        PRIMARY KEY (user_id, month)
    );",
    "CREATE TABLE IF NOT EXISTS step_memo (
        run_id TEXT NOT NULL,
        step_name TEXT NOT NULL,
        output TEXT NOT NULL,
        completed_at TEXT NOT NULL,
        PRIMARY KEY (run_id, step_name)
    );",
    "CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        data TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        completed_at TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_repositories_user ON repositories(user_id);",
    "CREATE INDEX IF NOT EXISTS idx_reviews_repository ON reviews(repository_id);",
    "CREATE INDEX IF NOT EXISTS idx_events_pending ON events(completed_at);",
];

pub fn user_version(conn: &Connection) -> StoreResult<i32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Brings the database up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let current = user_version(conn)?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for stmt in SCHEMA_STATEMENTS {
        tx.execute_batch(stmt)?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    info!(from = current, to = SCHEMA_VERSION, "schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }
}
