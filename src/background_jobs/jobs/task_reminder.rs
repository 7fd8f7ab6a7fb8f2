//! Task reminder background job.
//!
//! Notifies owners about tasks due within the next hour and about tasks whose
//! due date has passed. Overdue tasks are moved to the `overdue` status.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    reminders::{apply_actions, minutes_until, ReminderAction},
};
use crate::config::{TaskDedupPolicy, TaskReminderJobSettings};
use crate::notifications::{NotificationEmitter, Reminder, ReminderTarget};
use crate::run_store::RunSummary;
use crate::tracker_store::{Claim, ReminderCondition, Task, TaskStatus, TaskStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::info;

/// How far ahead a task counts as "due soon".
pub const DUE_SOON_WINDOW_MINUTES: i64 = 60;

pub struct TaskReminderJob {
    interval_minutes: u64,
    dedup_policy: TaskDedupPolicy,
}

impl TaskReminderJob {
    pub fn from_settings(settings: &TaskReminderJobSettings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
            dedup_policy: settings.dedup_policy,
        }
    }

    fn run(
        &self,
        ctx: &JobContext,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<(), JobError> {
        let window_end = now + ChronoDuration::minutes(DUE_SOON_WINDOW_MINUTES);
        let due_soon_mask = unfired_mask(self.dedup_policy, ReminderCondition::TaskDueSoon);
        let overdue_mask = unfired_mask(self.dedup_policy, ReminderCondition::TaskOverdue);

        let due_soon = ctx
            .tracker_store
            .find_tasks_due_between(now, window_end, due_soon_mask)
            .map_err(|e| {
                JobError::ExecutionFailed(format!("Failed to query due-soon tasks: {:#}", e))
            })?;
        let overdue = ctx
            .tracker_store
            .find_overdue_tasks(now, overdue_mask)
            .map_err(|e| {
                JobError::ExecutionFailed(format!("Failed to query overdue tasks: {:#}", e))
            })?;

        info!(
            "Found {} due-soon and {} overdue task candidates",
            due_soon.len(),
            overdue.len()
        );

        let actions = plan_task_reminders(now, &due_soon, &overdue, self.dedup_policy);
        apply_actions(ctx, actions, summary)
    }
}

/// Bits that, once set, exclude a task from `condition`'s query.
fn unfired_mask(policy: TaskDedupPolicy, condition: ReminderCondition) -> u32 {
    match policy {
        TaskDedupPolicy::Shared => {
            ReminderCondition::TaskDueSoon.bit() | ReminderCondition::TaskOverdue.bit()
        }
        TaskDedupPolicy::PerCondition => condition.bit(),
    }
}

fn claim_for(task: &Task, condition: ReminderCondition, policy: TaskDedupPolicy) -> Claim {
    let claim = Claim::new(task.id, condition);
    match policy {
        TaskDedupPolicy::Shared => claim.guarded_by(&[
            ReminderCondition::TaskDueSoon,
            ReminderCondition::TaskOverdue,
        ]),
        TaskDedupPolicy::PerCondition => claim,
    }
}

/// Decides which task reminders to send at `now`.
///
/// Due-soon actions come first so a task sitting on the boundary is reported as
/// due soon. Candidates that no longer match their predicate are dropped.
pub fn plan_task_reminders(
    now: DateTime<Utc>,
    due_soon: &[Task],
    overdue: &[Task],
    policy: TaskDedupPolicy,
) -> Vec<ReminderAction> {
    let window_end = now + ChronoDuration::minutes(DUE_SOON_WINDOW_MINUTES);
    let mut actions = Vec::with_capacity(due_soon.len() + overdue.len());

    for task in due_soon {
        let Some(due) = task.due_date else { continue };
        if task.status == TaskStatus::Completed
            || due < now
            || due > window_end
            || task
                .fired
                .intersects(unfired_mask(policy, ReminderCondition::TaskDueSoon))
        {
            continue;
        }

        let reminder = Reminder::TaskDueSoon {
            minutes_left: minutes_until(now, due),
        };
        actions.push(ReminderAction {
            condition: ReminderCondition::TaskDueSoon,
            entity_id: task.id,
            claim: Some(claim_for(task, ReminderCondition::TaskDueSoon, policy)),
            status_change: None,
            notification: NotificationEmitter::compose(
                &ReminderTarget::from(task),
                &reminder,
                now,
            ),
        });
    }

    for task in overdue {
        let Some(due) = task.due_date else { continue };
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Overdue)
            || due >= now
            || task
                .fired
                .intersects(unfired_mask(policy, ReminderCondition::TaskOverdue))
        {
            continue;
        }

        actions.push(ReminderAction {
            condition: ReminderCondition::TaskOverdue,
            entity_id: task.id,
            claim: Some(claim_for(task, ReminderCondition::TaskOverdue, policy)),
            status_change: Some(TaskStatus::Overdue),
            notification: NotificationEmitter::compose(
                &ReminderTarget::from(task),
                &Reminder::TaskOverdue,
                now,
            ),
        });
    }

    actions
}

impl BackgroundJob for TaskReminderJob {
    fn id(&self) -> &'static str {
        "task_reminders"
    }

    fn name(&self) -> &'static str {
        "Task Reminders"
    }

    fn description(&self) -> &'static str {
        "Notify owners of tasks due within the hour and of overdue tasks"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes * 60))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext, summary: &mut RunSummary) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = ctx.now();
        self.run(ctx, now, summary)?;
        if summary.emitted > 0 {
            info!("Sent {} task reminders", summary.emitted);
        }
        Ok(())
    }
}
