use super::models::{ReminderRun, RunStatus, RunSummary, RunTrigger};
use super::schema::RUN_VERSIONED_SCHEMAS;
use super::RunStore;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const RUN_COLUMNS: &str = "id, job_id, triggered_by, status, started_at, finished_at, error, summary";

const INTERRUPTED_ERROR: &str = "Run was interrupted (process restart)";

#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), RUN_VERSIONED_SCHEMAS, "run history")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    fn malformed(column: usize, what: &str, value: &str) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            format!("invalid {}: {:?}", what, value).into(),
        )
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ReminderRun> {
        let trigger_str: String = row.get("triggered_by")?;
        let status_str: String = row.get("status")?;
        let summary_str: Option<String> = row.get("summary")?;

        Ok(ReminderRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            trigger: RunTrigger::parse(&trigger_str)
                .ok_or_else(|| Self::malformed(2, "run trigger", &trigger_str))?,
            status: RunStatus::parse(&status_str)
                .ok_or_else(|| Self::malformed(3, "run status", &status_str))?,
            started_at: Self::from_millis(row.get("started_at")?),
            finished_at: row.get::<_, Option<i64>>("finished_at")?.map(Self::from_millis),
            error: row.get("error")?,
            summary: summary_str.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

impl RunStore for SqliteRunStore {
    fn start_run(
        &self,
        job_id: &str,
        trigger: RunTrigger,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (job_id, triggered_by, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                trigger.as_str(),
                RunStatus::Running.as_str(),
                started_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        error: Option<&str>,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let summary_json = serde_json::to_string(summary)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_runs SET status = ?1, error = ?2, summary = ?3, finished_at = ?4
             WHERE id = ?5",
            params![
                status.as_str(),
                error,
                summary_json,
                finished_at.timestamp_millis(),
                run_id
            ],
        )
        .with_context(|| format!("Failed to finish run {}", run_id))?;
        Ok(())
    }

    fn recent_runs(&self, job_id: &str, limit: usize) -> Result<Vec<ReminderRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_runs WHERE job_id = ?1
             ORDER BY started_at DESC, id DESC LIMIT ?2",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn fail_interrupted_runs(&self, at: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, error = ?3 WHERE status = ?4",
            params![
                RunStatus::Failed.as_str(),
                at.timestamp_millis(),
                INTERRUPTED_ERROR,
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM job_runs WHERE started_at < ?1 AND status != ?2",
            params![cutoff.timestamp_millis(), RunStatus::Running.as_str()],
        )?;
        Ok(deleted)
    }

    fn next_run_at(&self, job_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let next = conn
            .query_row(
                "SELECT next_run_at FROM job_schedule WHERE job_id = ?1",
                params![job_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(next.map(Self::from_millis))
    }

    fn set_next_run_at(&self, job_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_schedule (job_id, next_run_at) VALUES (?1, ?2)
             ON CONFLICT(job_id) DO UPDATE SET next_run_at = ?2",
            params![job_id, at.timestamp_millis()],
        )?;
        Ok(())
    }
}
