use super::context::JobContext;
use super::handle::{RunningJobs, SchedulerCommand, SchedulerHandle};
use super::job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
use crate::metrics;
use crate::run_store::{RunStatus, RunStore, RunSummary, RunTrigger};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the loop sleeps before re-checking schedules.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// How long shutdown waits for each running job.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
///
/// A job is never started while a previous run of the same job is still in
/// flight. Each run's task stores the next run time, counted from when the run
/// finished, before the job leaves the running set. Ticks that fell inside the
/// run are dropped rather than queued.
pub struct JobScheduler {
    /// Registered jobs by id
    jobs: HashMap<String, Arc<dyn BackgroundJob>>,

    /// Jobs with a run in flight, shared with SchedulerHandle
    running_jobs: RunningJobs,

    /// Task handles of in-flight runs (managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Run history and persisted next-run times.
    run_store: Arc<dyn RunStore>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,

    /// Per-run deadline handed to each job through its context.
    job_deadline: Option<Duration>,
}

impl JobScheduler {
    pub fn new(
        run_store: Arc<dyn RunStore>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        running_jobs: RunningJobs,
    ) -> Self {
        Self {
            jobs: HashMap::new(),
            running_jobs,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            run_store,
            command_receiver,
            shutdown_token,
            job_context,
            job_deadline: None,
        }
    }

    pub fn set_job_deadline(&mut self, deadline: Option<Duration>) {
        self.job_deadline = deadline;
    }

    /// Register a job with the scheduler.
    ///
    /// Cron jobs without a persisted next run get one stored here, so the
    /// first matching cron time is the one that fires.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());

        let schedule = job.schedule();
        if let JobSchedule::Cron(ref expr) = schedule {
            match self.run_store.next_run_at(&job_id) {
                Ok(Some(_)) => {}
                Ok(None) => match schedule.next_after(Utc::now()) {
                    Some(next_run) => persist_next_run(self.run_store.as_ref(), &job_id, next_run),
                    None => error!("Job {} has an unusable cron schedule: {}", job_id, expr),
                },
                Err(e) => warn!("Failed to read next run for {}: {}", job_id, e),
            }
        }

        self.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Main scheduler loop. Returns after the shutdown token is cancelled.
    pub async fn run(&mut self) {
        info!("Starting job scheduler with {} registered jobs", self.job_count());

        // On startup: runs left open by a previous process never finished
        match self.run_store.fail_interrupted_runs(Utc::now()) {
            Ok(count) if count > 0 => {
                info!("Marked {} interrupted runs as failed", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark interrupted runs: {}", e);
            }
        }

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        if !self.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        self.cleanup_completed_jobs().await;
        if self.running_jobs.read().await.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }

        self.spawn_job(job_id, RunTrigger::Manual).await;
        Ok(())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = MAX_SLEEP;
        let now = Utc::now();

        let running = self.running_jobs.read().await;
        for (job_id, job) in &self.jobs {
            if running.contains(job_id) {
                continue;
            }

            if let Some(next_run) = self.get_next_run_time(job_id, &job.schedule(), now) {
                if next_run <= now {
                    return Duration::ZERO;
                }
                let duration = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
                min_duration = min_duration.min(duration);
            }
        }

        min_duration
    }

    /// Get the next scheduled run time for a job.
    ///
    /// Interval jobs that have never run are due immediately.
    fn get_next_run_time(
        &self,
        job_id: &str,
        schedule: &JobSchedule,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self.run_store.next_run_at(job_id) {
            Ok(Some(next_run)) => Some(next_run),
            Ok(None) => match schedule {
                JobSchedule::Interval(_) => Some(now),
                JobSchedule::Cron(_) => schedule.next_after(now),
            },
            Err(e) => {
                warn!("Failed to read next run for {}: {}", job_id, e);
                None
            }
        }
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        self.cleanup_completed_jobs().await;

        let now = Utc::now();
        let mut jobs_to_run = Vec::new();

        {
            let running = self.running_jobs.read().await;
            for (job_id, job) in &self.jobs {
                if running.contains(job_id) {
                    debug!("Skipping tick for already running job: {}", job_id);
                    continue;
                }

                if let Some(next_run) = self.get_next_run_time(job_id, &job.schedule(), now) {
                    if next_run <= now {
                        jobs_to_run.push(job_id.clone());
                    }
                }
            }
        }

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, RunTrigger::Schedule).await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, trigger: RunTrigger) {
        let Some(job) = self.jobs.get(job_id).map(Arc::clone) else {
            error!("Attempted to spawn unknown job: {}", job_id);
            return;
        };

        let started_at = Utc::now();
        let run_id = match self.run_store.start_run(job_id, trigger, started_at) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to record run start for {}: {}", job_id, e);
                return;
            }
        };

        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_id,
            run_id,
            trigger.as_str()
        );

        self.running_jobs.write().await.insert(job_id.to_string());

        // If the process dies mid-run, the restart waits a full period
        // instead of re-running at once.
        let schedule = job.schedule();
        if let Some(next_run) = schedule.next_after(started_at) {
            persist_next_run(self.run_store.as_ref(), job_id, next_run);
        }

        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let deadline = self.job_deadline.map(|d| Instant::now() + d);
        let ctx = self.job_context.for_run(cancel_token, deadline);

        let run_store = Arc::clone(&self.run_store);
        let job_id_owned = job_id.to_string();
        let running_jobs = Arc::clone(&self.running_jobs);

        // Jobs are synchronous, run them on the blocking pool
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                let mut summary = RunSummary::default();
                let result = job.execute(&ctx, &mut summary);
                (result, summary)
            })
            .await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label, summary) = match result {
                Ok((Ok(()), summary)) => {
                    info!(
                        "Job {} completed successfully in {:?}: {:?}",
                        job_id_owned, elapsed, summary
                    );
                    (RunStatus::Completed, None, "success", summary)
                }
                Ok((Err(JobError::Cancelled), summary)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        RunStatus::Cancelled,
                        Some("Cancelled".to_string()),
                        "cancelled",
                        summary,
                    )
                }
                Ok((Err(e @ JobError::Timeout), summary)) => {
                    warn!(
                        "Job {} hit its deadline after {:?}, remaining work left for the next run",
                        job_id_owned, elapsed
                    );
                    (RunStatus::TimedOut, Some(e.to_string()), "timeout", summary)
                }
                Ok((Err(e), summary)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (RunStatus::Failed, Some(e.to_string()), "failed", summary)
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        RunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                        RunSummary::default(),
                    )
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            let finished_at = Utc::now();
            if let Err(e) = run_store.finish_run(
                run_id,
                status,
                error_msg.as_deref(),
                &summary,
                finished_at,
            ) {
                error!("Failed to record run finish for {}: {}", job_id_owned, e);
            }

            // Must be stored before the job leaves the running set, or the
            // loop would see the start-based time and run again at once.
            if let Some(next_run) = schedule.next_after(finished_at) {
                persist_next_run(run_store.as_ref(), &job_id_owned, next_run);
            }

            running_jobs.write().await.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Reap handles and tokens of runs that have finished.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        // Cancel cancellable jobs
        {
            let running = self.running_jobs.read().await;
            for job_id in running.iter() {
                if let Some(job) = self.jobs.get(job_id) {
                    if job.shutdown_behavior() == ShutdownBehavior::Cancellable {
                        if let Some(token) = self.job_cancel_tokens.get(job_id) {
                            debug!("Cancelling job: {}", job_id);
                            token.cancel();
                        }
                    }
                }
            }
        }

        for (job_id, handle) in self.running_handles.drain() {
            let behavior = self
                .jobs
                .get(&job_id)
                .map(|j| j.shutdown_behavior())
                .unwrap_or_default();
            if behavior == ShutdownBehavior::WaitForCompletion {
                info!("Waiting for job {} to complete...", job_id);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_GRACE);
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

fn persist_next_run(run_store: &dyn RunStore, job_id: &str, next_run: DateTime<Utc>) {
    if let Err(e) = run_store.set_next_run_at(job_id, next_run) {
        error!("Failed to store next run for {}: {}", job_id, e);
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    run_store: Arc<dyn RunStore>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let running_jobs: RunningJobs = Arc::new(RwLock::new(HashSet::new()));

    let scheduler = JobScheduler::new(
        Arc::clone(&run_store),
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&running_jobs),
    );

    let handle = SchedulerHandle::new(command_tx, running_jobs, run_store);

    (scheduler, handle)
}
