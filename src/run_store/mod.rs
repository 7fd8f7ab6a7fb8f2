//! History of reminder runs and the persisted next-run time of each job.
//! Kept in its own database, apart from tracker data.

mod models;
mod schema;
mod sqlite_run_store;

pub use models::*;
pub use schema::RUN_VERSIONED_SCHEMAS;
pub use sqlite_run_store::SqliteRunStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait RunStore: Send + Sync {
    /// Records a run as started and returns its id.
    fn start_run(&self, job_id: &str, trigger: RunTrigger, started_at: DateTime<Utc>)
        -> Result<i64>;
    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        error: Option<&str>,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Runs of `job_id`, newest first.
    fn recent_runs(&self, job_id: &str, limit: usize) -> Result<Vec<ReminderRun>>;
    /// Fails every run still marked as running. Called once at startup.
    fn fail_interrupted_runs(&self, at: DateTime<Utc>) -> Result<usize>;
    /// Deletes finished runs that started before `cutoff`.
    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn next_run_at(&self, job_id: &str) -> Result<Option<DateTime<Utc>>>;
    fn set_next_run_at(&self, job_id: &str, at: DateTime<Utc>) -> Result<()>;
}
