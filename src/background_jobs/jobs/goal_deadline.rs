//! Goal deadline background job.
//!
//! Runs once a day. Goals whose target date is within the next week get an
//! "approaching" reminder, goals past their target date get a "missed" one.
//! Under the default policy the reminders repeat on every run until the goal
//! is completed or abandoned.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    reminders::{apply_actions, ReminderAction},
};
use crate::config::{GoalDeadlineJobSettings, GoalReminderPolicy};
use crate::notifications::{NotificationEmitter, Reminder, ReminderTarget};
use crate::run_store::RunSummary;
use crate::tracker_store::{Claim, Goal, GoalStore, ReminderCondition};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::info;

pub const APPROACHING_WINDOW_DAYS: i64 = 7;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct GoalDeadlineJob {
    cron: String,
    policy: GoalReminderPolicy,
}

impl GoalDeadlineJob {
    pub fn from_settings(settings: &GoalDeadlineJobSettings) -> Self {
        Self {
            cron: settings.cron.clone(),
            policy: settings.policy,
        }
    }
}

/// Whole days from `now` until `target`, rounded up.
fn days_until(now: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    let ms = (target - now).num_milliseconds();
    (ms + DAY_MS - 1).div_euclid(DAY_MS)
}

/// Decides which goal reminders to send at `now`.
pub fn plan_goal_reminders(
    now: DateTime<Utc>,
    goals: &[Goal],
    policy: GoalReminderPolicy,
) -> Vec<ReminderAction> {
    let window_end = now + ChronoDuration::days(APPROACHING_WINDOW_DAYS);
    let mut actions = Vec::new();

    for goal in goals {
        let Some(target) = goal.target_date else { continue };
        if goal.status.is_resolved() || target > window_end {
            continue;
        }

        let reminder = if target < now {
            Reminder::GoalMissed
        } else {
            Reminder::GoalApproaching {
                days_left: days_until(now, target),
            }
        };
        let condition = reminder.condition();

        let claim = match policy {
            GoalReminderPolicy::RepeatUntilResolved => None,
            GoalReminderPolicy::FireOnce => {
                if goal.fired.contains(condition) {
                    continue;
                }
                Some(Claim::new(goal.id, condition))
            }
        };

        actions.push(ReminderAction {
            condition,
            entity_id: goal.id,
            claim,
            status_change: None,
            notification: NotificationEmitter::compose(
                &ReminderTarget::from(goal),
                &reminder,
                now,
            ),
        });
    }

    actions
}

impl BackgroundJob for GoalDeadlineJob {
    fn id(&self) -> &'static str {
        "goal_deadlines"
    }

    fn name(&self) -> &'static str {
        "Goal Deadlines"
    }

    fn description(&self) -> &'static str {
        "Remind owners of goals with approaching or missed target dates"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.cron.clone())
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext, summary: &mut RunSummary) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = ctx.now();

        // Fired markers are checked by the planner, both conditions share a query
        let until = now + ChronoDuration::days(APPROACHING_WINDOW_DAYS);
        let goals = ctx
            .tracker_store
            .find_open_goals_due_before(until, 0)
            .map_err(|e| JobError::ExecutionFailed(format!("Failed to query open goals: {:#}", e)))?;

        let actions = plan_goal_reminders(now, &goals, self.policy);
        apply_actions(ctx, actions, summary)?;
        info!(
            "Checked {} open goals, sent {} deadline reminders (policy {})",
            goals.len(),
            summary.emitted,
            self.policy.as_str()
        );
        Ok(())
    }
}
