use super::context::JobContext;
use crate::run_store::RunSummary;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Schedule for when a job should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run at specific times using cron syntax (seconds field first, evaluated in UTC)
    Cron(String),
    /// Run at fixed intervals, measured from the end of the previous run
    Interval(Duration),
}

impl JobSchedule {
    /// First run time strictly after `after`, or None if the cron expression is invalid.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Interval(interval) => {
                Some(after + chrono::Duration::from_std(*interval).unwrap_or_default())
            }
            JobSchedule::Cron(expr) => match cron::Schedule::from_str(expr) {
                Ok(schedule) => schedule.after(&after).next(),
                Err(e) => {
                    warn!("Invalid cron expression '{}': {}", expr, e);
                    None
                }
            },
        }
    }
}

/// How a job should be handled during server shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for job to complete before shutdown
    WaitForCompletion,
}

/// Errors that can occur during job execution.
#[derive(Debug)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    ExecutionFailed(String),
    Cancelled,
    Timeout,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
            JobError::Timeout => write!(f, "Job timed out"),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for background jobs.
///
/// Jobs are executed synchronously in a blocking context.
/// Long-running work should check `ctx.stop_reason()` between items.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// How this job should be handled during shutdown.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Execute the job, counting what it did into `summary`.
    ///
    /// This method is called from a blocking context using `spawn_blocking`.
    /// The summary is stored with the run even when an error is returned.
    fn execute(&self, ctx: &JobContext, summary: &mut RunSummary) -> Result<(), JobError>;
}
