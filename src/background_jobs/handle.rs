use super::job::JobError;
use crate::run_store::{ReminderRun, RunStore};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Ids of jobs with a run in flight. Written by the scheduler and by each
/// run's task as it finishes.
pub type RunningJobs = Arc<RwLock<HashSet<String>>>;

/// Handle to trigger jobs and look at their runs while the scheduler loop
/// owns execution.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    running_jobs: RunningJobs,
    run_store: Arc<dyn RunStore>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        running_jobs: RunningJobs,
        run_store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            command_tx,
            running_jobs,
            run_store,
        }
    }

    /// Trigger a job manually. Returns once the run has been spawned, not finished.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.running_jobs.read().await.contains(job_id)
    }

    /// Runs of `job_id` with their summaries, newest first.
    pub fn recent_runs(&self, job_id: &str, limit: usize) -> Result<Vec<ReminderRun>> {
        self.run_store.recent_runs(job_id, limit)
    }
}
