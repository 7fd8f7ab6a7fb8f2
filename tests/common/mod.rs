//! Common test infrastructure
//!
//! Builds a reminder engine on temporary databases with a clock the test
//! controls. Tests should only import from this module.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use stutrack_reminders::background_jobs::{BackgroundJob, JobContext, JobError, RunSummary};
use stutrack_reminders::clock::{Clock, FixedClock};
use stutrack_reminders::notifications::{NotificationEmitter, NotificationStore};
use stutrack_reminders::run_store::SqliteRunStore;
use stutrack_reminders::tracker_store::{
    EntityId, EventStore, GoalStatus, GoalStore, NewCalendarEvent, NewGoal, NewTask, Priority,
    SqliteTrackerStore, TaskStatus, TaskStore, UserId,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const STUDENT_ID: UserId = 7;

/// Monday morning, so daily runs land on predictable dates.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

pub struct TestEngine {
    pub tracker: Arc<SqliteTrackerStore>,
    pub runs: Arc<SqliteRunStore>,
    pub clock: Arc<FixedClock>,
    pub shutdown_token: CancellationToken,
    pub ctx: JobContext,
    pub temp_dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let tracker =
            Arc::new(SqliteTrackerStore::new(temp_dir.path().join("tracker.db")).unwrap());
        let runs = Arc::new(SqliteRunStore::new(temp_dir.path().join("runs.db")).unwrap());
        let clock = Arc::new(FixedClock::new(start_time()));
        let shutdown_token = CancellationToken::new();
        let ctx = context_for(tracker.clone(), runs.clone(), clock.clone(), &shutdown_token);

        Self {
            tracker,
            runs,
            clock,
            shutdown_token,
            ctx,
            temp_dir,
        }
    }

    /// A second worker on the same databases, with its own connections.
    pub fn second_worker(&self) -> JobContext {
        let tracker = Arc::new(
            SqliteTrackerStore::new(self.temp_dir.path().join("tracker.db")).unwrap(),
        );
        let runs = Arc::new(SqliteRunStore::new(self.temp_dir.path().join("runs.db")).unwrap());
        context_for(tracker, runs, self.clock.clone(), &self.shutdown_token)
    }

    /// Executes `job` once on this engine's context.
    pub fn run(&self, job: &dyn BackgroundJob) -> Result<RunSummary, JobError> {
        run_on(&self.ctx, job)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: ChronoDuration) {
        self.clock.advance(by);
    }

    pub fn add_task(&self, due_in: ChronoDuration, priority: Priority) -> EntityId {
        self.tracker
            .create_task(&NewTask {
                owner_id: STUDENT_ID,
                title: "Lab report".to_string(),
                due_date: Some(self.now() + due_in),
                priority,
                status: TaskStatus::Pending,
            })
            .unwrap()
    }

    pub fn add_event(&self, starts_in: ChronoDuration, reminder_minutes: u32) -> EntityId {
        let start_date = self.now() + starts_in;
        self.tracker
            .create_event(&NewCalendarEvent {
                owner_id: STUDENT_ID,
                title: "Seminar".to_string(),
                start_date,
                end_date: Some(start_date + ChronoDuration::hours(2)),
                reminder_minutes,
            })
            .unwrap()
    }

    pub fn add_goal(&self, target_in: ChronoDuration, priority: Priority) -> EntityId {
        self.tracker
            .create_goal(&NewGoal {
                owner_id: STUDENT_ID,
                title: "Finish reading list".to_string(),
                target_date: Some(self.now() + target_in),
                priority,
                status: GoalStatus::NotStarted,
            })
            .unwrap()
    }

    /// Messages delivered to the student, sorted for stable comparison.
    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = self
            .tracker
            .get_user_notifications(STUDENT_ID)
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        messages.sort();
        messages
    }

    pub fn notification_count(&self) -> usize {
        self.tracker.get_user_notifications(STUDENT_ID).unwrap().len()
    }
}

/// Executes `job` once on `ctx`, e.g. a second worker's context.
pub fn run_on(ctx: &JobContext, job: &dyn BackgroundJob) -> Result<RunSummary, JobError> {
    let mut summary = RunSummary::default();
    job.execute(ctx, &mut summary)?;
    Ok(summary)
}

fn context_for(
    tracker: Arc<SqliteTrackerStore>,
    runs: Arc<SqliteRunStore>,
    clock: Arc<FixedClock>,
    shutdown_token: &CancellationToken,
) -> JobContext {
    let emitter = Arc::new(NotificationEmitter::new(tracker.clone()));
    JobContext::new(shutdown_token.child_token(), tracker, emitter, runs, clock)
}
