//! Run history cleanup background job.
//!
//! Every reminder run leaves a row with its summary in the run history;
//! this job deletes finished runs older than the configured retention period.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::config::RunHistoryCleanupJobSettings;
use crate::run_store::RunSummary;
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tracing::info;

pub struct RunHistoryCleanupJob {
    interval_hours: u64,
    retention_days: u64,
}

impl RunHistoryCleanupJob {
    pub fn from_settings(settings: &RunHistoryCleanupJobSettings) -> Self {
        Self {
            interval_hours: settings.interval_hours,
            retention_days: settings.retention_days,
        }
    }
}

impl BackgroundJob for RunHistoryCleanupJob {
    fn id(&self) -> &'static str {
        "run_history_cleanup"
    }

    fn name(&self) -> &'static str {
        "Run History Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete old reminder run history based on retention policy"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_hours * 60 * 60))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext, summary: &mut RunSummary) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = ctx.now() - ChronoDuration::days(self.retention_days as i64);
        info!(
            "Cleaning up runs older than {} days (cutoff: {})",
            self.retention_days,
            cutoff.to_rfc3339()
        );

        let deleted = ctx
            .run_store
            .prune_runs_before(cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        summary.pruned = deleted;

        if deleted > 0 {
            info!("Deleted {} old runs", deleted);
        } else {
            info!("No runs to clean up");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::test_support::TestContext;
    use crate::clock::Clock;
    use crate::run_store::{RunStatus, RunStore, RunTrigger};

    fn finished_run(test: &TestContext, days_ago: i64) -> i64 {
        let started_at = test.clock.now() - ChronoDuration::days(days_ago);
        let run_id = test
            .runs
            .start_run("task_reminders", RunTrigger::Schedule, started_at)
            .unwrap();
        test.runs
            .finish_run(
                run_id,
                RunStatus::Completed,
                None,
                &RunSummary::default(),
                started_at,
            )
            .unwrap();
        run_id
    }

    #[test]
    fn test_job_metadata() {
        let job = RunHistoryCleanupJob::from_settings(&RunHistoryCleanupJobSettings::default());
        assert_eq!(job.id(), "run_history_cleanup");
        assert_eq!(
            job.schedule(),
            JobSchedule::Interval(Duration::from_secs(24 * 60 * 60))
        );
    }

    #[test]
    fn test_prunes_runs_past_retention() {
        let test = TestContext::new();
        finished_run(&test, 45);
        let recent = finished_run(&test, 3);

        let job = RunHistoryCleanupJob::from_settings(&RunHistoryCleanupJobSettings::default());
        let summary = test.run(&job).unwrap();
        assert_eq!(summary.pruned, 1);

        let remaining = test.runs.recent_runs("task_reminders", 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, recent);
    }

    #[test]
    fn test_zero_retention_keeps_running_runs() {
        let test = TestContext::new();
        finished_run(&test, 1);
        test.runs
            .start_run(
                "event_reminders",
                RunTrigger::Schedule,
                test.clock.now() - ChronoDuration::hours(1),
            )
            .unwrap();

        let job = RunHistoryCleanupJob::from_settings(&RunHistoryCleanupJobSettings {
            interval_hours: 24,
            retention_days: 0,
        });
        assert_eq!(test.run(&job).unwrap().pruned, 1);

        assert!(test.runs.recent_runs("task_reminders", 10).unwrap().is_empty());
        assert_eq!(test.runs.recent_runs("event_reminders", 10).unwrap().len(), 1);
    }
}
