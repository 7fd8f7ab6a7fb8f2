//! Shared fixtures for job and scheduler tests.

use super::context::JobContext;
use super::job::{BackgroundJob, JobError};
use crate::clock::FixedClock;
use crate::notifications::{NotificationEmitter, NotificationStore};
use crate::run_store::{RunSummary, SqliteRunStore};
use crate::tracker_store::{SqliteTrackerStore, UserId};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestContext {
    pub tracker: Arc<SqliteTrackerStore>,
    pub runs: Arc<SqliteRunStore>,
    pub clock: Arc<FixedClock>,
    pub ctx: JobContext,
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let tracker = Arc::new(SqliteTrackerStore::new(temp_dir.path().join("tracker.db")).unwrap());
        let runs = Arc::new(SqliteRunStore::new(temp_dir.path().join("runs.db")).unwrap());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
        ));
        let emitter = Arc::new(NotificationEmitter::new(tracker.clone()));

        let ctx = JobContext::new(
            CancellationToken::new(),
            tracker.clone(),
            emitter,
            runs.clone(),
            clock.clone(),
        );

        Self {
            tracker,
            runs,
            clock,
            ctx,
            temp_dir,
        }
    }

    /// Executes `job` once against this context.
    pub fn run(&self, job: &dyn BackgroundJob) -> Result<RunSummary, JobError> {
        let mut summary = RunSummary::default();
        job.execute(&self.ctx, &mut summary)?;
        Ok(summary)
    }

    pub fn notification_count(&self, user_id: UserId) -> usize {
        self.tracker.get_user_notifications(user_id).unwrap().len()
    }
}
