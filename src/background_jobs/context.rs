use super::job::JobError;
use crate::clock::Clock;
use crate::notifications::NotificationEmitter;
use crate::run_store::RunStore;
use crate::tracker_store::FullTrackerStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources, the time source, and the
/// signals (cancellation, deadline) that tell a job to stop picking up work.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Instant after which the run should stop taking new candidates.
    pub deadline: Option<Instant>,

    /// Tasks, calendar events, goals and notifications.
    pub tracker_store: Arc<dyn FullTrackerStore>,

    pub emitter: Arc<NotificationEmitter>,

    /// Run history, for jobs that maintain it.
    pub run_store: Arc<dyn RunStore>,

    pub clock: Arc<dyn Clock>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        tracker_store: Arc<dyn FullTrackerStore>,
        emitter: Arc<NotificationEmitter>,
        run_store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cancellation_token,
            deadline: None,
            tracker_store,
            emitter,
            run_store,
            clock,
        }
    }

    /// Copy of this context for a single run.
    pub fn for_run(&self, cancellation_token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self {
            cancellation_token,
            deadline,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn is_past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Why the job should stop now, if it should.
    pub fn stop_reason(&self) -> Option<JobError> {
        if self.is_cancelled() {
            Some(JobError::Cancelled)
        } else if self.is_past_deadline() {
            Some(JobError::Timeout)
        } else {
            None
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
