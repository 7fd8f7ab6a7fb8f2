//! Shared execution of planned reminders.
//!
//! Each reminder job turns its candidates into a list of [`ReminderAction`]s
//! with a pure planner; [`apply_actions`] then performs them against the
//! stores. A notification is only written after its claim succeeded, so a
//! crash between the two loses the reminder rather than duplicating it.
//! One candidate's store error never stops the rest of the run.

use super::context::JobContext;
use super::job::JobError;
use crate::metrics;
use crate::notifications::NewNotification;
use crate::run_store::RunSummary;
use crate::tracker_store::{Claim, ClaimStore, EntityId, ReminderCondition, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

/// One reminder the planner decided to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderAction {
    pub condition: ReminderCondition,
    pub entity_id: EntityId,
    /// None for reminders that repeat every run.
    pub claim: Option<Claim>,
    /// New task status to apply once the claim is won.
    pub status_change: Option<TaskStatus>,
    pub notification: NewNotification,
}

/// Applies `actions` in order, accumulating into `summary`.
///
/// Stops before the next claim once the job is cancelled or past its deadline,
/// returning the reason. A won claim always gets its status change and emission
/// attempted.
pub fn apply_actions(
    ctx: &JobContext,
    actions: Vec<ReminderAction>,
    summary: &mut RunSummary,
) -> Result<(), JobError> {
    summary.candidates += actions.len();

    for action in actions {
        if let Some(reason) = ctx.stop_reason() {
            warn!(
                "Stopping before {} for {}: {}",
                action.condition.as_str(),
                action.entity_id,
                reason
            );
            return Err(reason);
        }

        if let Some(claim) = &action.claim {
            match ctx.tracker_store.claim(claim) {
                Ok(true) => {
                    summary.claimed += 1;
                    metrics::record_reminder_claim(action.condition.as_str(), "won");
                }
                Ok(false) => {
                    summary.already_claimed += 1;
                    metrics::record_reminder_claim(action.condition.as_str(), "already_claimed");
                    debug!(
                        "{} for {} already claimed",
                        action.condition.as_str(),
                        action.entity_id
                    );
                    continue;
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_reminder_claim(action.condition.as_str(), "error");
                    warn!(
                        "Failed to claim {} for {}, skipping: {:#}",
                        action.condition.as_str(),
                        action.entity_id,
                        e
                    );
                    continue;
                }
            }
        }

        if let Some(status) = action.status_change {
            if let Err(e) = ctx
                .tracker_store
                .update_task_status(action.entity_id, status)
            {
                warn!(
                    "Failed to set task {} to {}: {:#}",
                    action.entity_id, status, e
                );
            }
        }

        match ctx.emitter.deliver(&action.notification) {
            Ok(_) => summary.emitted += 1,
            Err(e) if action.claim.is_some() => {
                summary.lost += 1;
                error!(
                    "Lost {} notification for {} after a successful claim: {:#}",
                    action.condition.as_str(),
                    action.entity_id,
                    e
                );
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    "Failed to emit {} notification for {}: {:#}",
                    action.condition.as_str(),
                    action.entity_id,
                    e
                );
            }
        }
    }

    Ok(())
}

/// Whole minutes from `now` until `then`, rounded up, at least 1.
pub fn minutes_until(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    let ms = (then - now).num_milliseconds();
    ((ms + 59_999).div_euclid(60_000)).max(1)
}
