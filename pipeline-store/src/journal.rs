//! Durable step memo and event journal.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use review_pipeline::PipelineResult;
use review_pipeline::events::{Event, EventId};
use review_pipeline::journal::EventJournal;
use review_pipeline::step::{RunId, StepMemo};
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::SqliteStore;
use crate::errors::{StoreError, StoreResult};

impl StepMemo for SqliteStore {
    fn load<'a>(
        &'a self,
        run: &'a RunId,
        step: &'a str,
    ) -> BoxFuture<'a, PipelineResult<Option<Value>>> {
        let (run, step) = (run.as_str().to_string(), step.to_string());
        Box::pin(self.call(move |c| {
            let raw: Option<String> = c
                .query_row(
                    "SELECT output FROM step_memo WHERE run_id = ?1 AND step_name = ?2",
                    params![run, step],
                    |r| r.get(0),
                )
                .optional()?;
            raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        }))
    }

    fn save<'a>(
        &'a self,
        run: &'a RunId,
        step: &'a str,
        output: Value,
    ) -> BoxFuture<'a, PipelineResult<()>> {
        let (run, step) = (run.as_str().to_string(), step.to_string());
        Box::pin(self.call(move |c| {
            c.execute(
                "INSERT OR IGNORE INTO step_memo(run_id, step_name, output, completed_at) \
                 VALUES(?1, ?2, ?3, ?4)",
                params![run, step, serde_json::to_string(&output)?, Utc::now()],
            )?;
            Ok(())
        }))
    }

    fn forget<'a>(&'a self, runs: &'a [RunId]) -> BoxFuture<'a, PipelineResult<usize>> {
        let runs: Vec<String> = runs.iter().map(|r| r.as_str().to_string()).collect();
        Box::pin(self.call(move |c| {
            let tx = c.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM step_memo WHERE run_id = ?1")?;
                for run in &runs {
                    removed += stmt.execute(params![run])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        }))
    }
}

impl EventJournal for SqliteStore {
    fn record<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, PipelineResult<()>> {
        let event = event.clone();
        Box::pin(self.call(move |c| {
            c.execute(
                "INSERT OR IGNORE INTO events(id, name, data, occurred_at) VALUES(?1, ?2, ?3, ?4)",
                params![
                    event.id.to_string(),
                    event.name,
                    serde_json::to_string(&event.data)?,
                    event.occurred_at
                ],
            )?;
            Ok(())
        }))
    }

    fn complete<'a>(&'a self, id: EventId) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(self.call(move |c| {
            c.execute(
                "UPDATE events SET completed_at = ?2 WHERE id = ?1 AND completed_at IS NULL",
                params![id.to_string(), Utc::now()],
            )?;
            Ok(())
        }))
    }

    fn pending<'a>(&'a self) -> BoxFuture<'a, PipelineResult<Vec<Event>>> {
        Box::pin(self.call(|c| {
            let mut stmt = c.prepare(
                "SELECT id, name, data, occurred_at FROM events \
                 WHERE completed_at IS NULL ORDER BY occurred_at, rowid",
            )?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, DateTime<Utc>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(event_from_row).collect()
        }))
    }

    fn prune<'a>(
        &'a self,
        completed_before: DateTime<Utc>,
    ) -> BoxFuture<'a, PipelineResult<Vec<Event>>> {
        Box::pin(self.call(move |c| {
            let tx = c.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(
                    "SELECT id, name, data, occurred_at FROM events \
                     WHERE completed_at IS NOT NULL AND completed_at < ?1",
                )?;
                stmt.query_map(params![completed_before], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, DateTime<Utc>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                "DELETE FROM events WHERE completed_at IS NOT NULL AND completed_at < ?1",
                params![completed_before],
            )?;
            tx.commit()?;
            rows.into_iter().map(event_from_row).collect()
        }))
    }
}

fn event_from_row(
    (id, name, data, occurred_at): (String, String, String, DateTime<Utc>),
) -> StoreResult<Event> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::Corrupt(format!("event id '{id}': {e}")))?;
    Ok(Event {
        id: EventId(id),
        name,
        data: serde_json::from_str(&data)?,
        occurred_at,
    })
}
