//! Calendar event reminder background job.
//!
//! Sends one reminder per event once the event's own reminder lead time
//! (minutes before start) has been reached.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    reminders::{apply_actions, minutes_until, ReminderAction},
};
use crate::config::EventReminderJobSettings;
use crate::notifications::{NotificationEmitter, Reminder, ReminderTarget};
use crate::run_store::RunSummary;
use crate::tracker_store::{CalendarEvent, Claim, EventStore, ReminderCondition};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::info;

pub struct EventReminderJob {
    interval_minutes: u64,
}

impl EventReminderJob {
    pub fn from_settings(settings: &EventReminderJobSettings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
        }
    }
}

/// Decides which event reminders to send at `now`.
pub fn plan_event_reminders(now: DateTime<Utc>, events: &[CalendarEvent]) -> Vec<ReminderAction> {
    events
        .iter()
        .filter(|event| {
            let opens_at =
                event.start_date - ChronoDuration::minutes(event.lead_minutes() as i64);
            event.start_date > now
                && now >= opens_at
                && !event.fired.contains(ReminderCondition::EventStarting)
        })
        .map(|event| {
            let reminder = Reminder::EventStarting {
                minutes_until: minutes_until(now, event.start_date),
            };
            ReminderAction {
                condition: ReminderCondition::EventStarting,
                entity_id: event.id,
                claim: Some(Claim::new(event.id, ReminderCondition::EventStarting)),
                status_change: None,
                notification: NotificationEmitter::compose(
                    &ReminderTarget::from(event),
                    &reminder,
                    now,
                ),
            }
        })
        .collect()
}

impl BackgroundJob for EventReminderJob {
    fn id(&self) -> &'static str {
        "event_reminders"
    }

    fn name(&self) -> &'static str {
        "Event Reminders"
    }

    fn description(&self) -> &'static str {
        "Remind owners of calendar events that are about to start"
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
        let events = ctx
            .tracker_store
            .find_events_in_reminder_window(now, ReminderCondition::EventStarting.bit())
            .map_err(|e| {
                JobError::ExecutionFailed(format!("Failed to query upcoming events: {:#}", e))
            })?;

        apply_actions(ctx, plan_event_reminders(now, &events), summary)?;
        if summary.emitted > 0 {
            info!("Sent {} event reminders", summary.emitted);
        }
        Ok(())
    }
}
