//! Builds reminder notifications and persists them.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::models::{NewNotification, Notification, NotificationPriority, NotificationType, RefModel};
use super::store::NotificationStore;
use crate::metrics;
use crate::tracker_store::{
    CalendarEvent, EntityId, EntityKind, Goal, Priority, ReminderCondition, Task, UserId,
};

/// The record a reminder is about, reduced to what the message needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTarget {
    pub kind: EntityKind,
    pub id: EntityId,
    pub owner_id: UserId,
    pub title: String,
    pub priority: Priority,
}

impl From<&Task> for ReminderTarget {
    fn from(task: &Task) -> Self {
        Self {
            kind: EntityKind::Task,
            id: task.id,
            owner_id: task.owner_id,
            title: task.title.clone(),
            priority: task.priority,
        }
    }
}

impl From<&CalendarEvent> for ReminderTarget {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            kind: EntityKind::CalendarEvent,
            id: event.id,
            owner_id: event.owner_id,
            title: event.title.clone(),
            priority: Priority::Medium,
        }
    }
}

impl From<&Goal> for ReminderTarget {
    fn from(goal: &Goal) -> Self {
        Self {
            kind: EntityKind::Goal,
            id: goal.id,
            owner_id: goal.owner_id,
            title: goal.title.clone(),
            priority: goal.priority,
        }
    }
}

/// Which reminder fired, with the figures quoted in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reminder {
    TaskDueSoon { minutes_left: i64 },
    TaskOverdue,
    EventStarting { minutes_until: i64 },
    GoalApproaching { days_left: i64 },
    GoalMissed,
}

impl Reminder {
    pub fn condition(&self) -> ReminderCondition {
        match self {
            Reminder::TaskDueSoon { .. } => ReminderCondition::TaskDueSoon,
            Reminder::TaskOverdue => ReminderCondition::TaskOverdue,
            Reminder::EventStarting { .. } => ReminderCondition::EventStarting,
            Reminder::GoalApproaching { .. } => ReminderCondition::GoalApproaching,
            Reminder::GoalMissed => ReminderCondition::GoalMissed,
        }
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

pub struct NotificationEmitter {
    store: Arc<dyn NotificationStore>,
}

impl NotificationEmitter {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Builds the notification for `reminder` on `target` without touching storage.
    pub fn compose(
        target: &ReminderTarget,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> NewNotification {
        let entity_priority = NotificationPriority::from_entity_priority(target.priority);
        let (notification_type, priority, title, message) = match *reminder {
            Reminder::TaskDueSoon { minutes_left } => (
                NotificationType::Task,
                entity_priority,
                "Task Due Soon",
                format!(
                    "\"{}\" is due in {}.",
                    target.title,
                    plural(minutes_left, "minute")
                ),
            ),
            Reminder::TaskOverdue => (
                NotificationType::Task,
                NotificationPriority::High,
                "Task Overdue",
                format!("\"{}\" is now overdue.", target.title),
            ),
            Reminder::EventStarting { minutes_until } => (
                NotificationType::Calendar,
                NotificationPriority::Normal,
                "Event Reminder",
                format!(
                    "\"{}\" is starting in {}.",
                    target.title,
                    plural(minutes_until, "minute")
                ),
            ),
            Reminder::GoalApproaching { days_left } => (
                NotificationType::Goal,
                entity_priority,
                "Goal Deadline Approaching",
                format!(
                    "\"{}\" has {} remaining to complete.",
                    target.title,
                    plural(days_left, "day")
                ),
            ),
            Reminder::GoalMissed => (
                NotificationType::Goal,
                NotificationPriority::High,
                "Goal Deadline Missed",
                format!(
                    "\"{}\" has passed its target date. Consider updating the goal or target date.",
                    target.title
                ),
            ),
        };

        NewNotification {
            user_id: target.owner_id,
            notification_type,
            title: title.to_string(),
            message,
            related_id: Some(target.id),
            ref_model: Some(RefModel::from(target.kind)),
            priority,
            delivery_date: now.timestamp_millis(),
        }
    }

    /// Persists an already composed notification.
    pub fn deliver(&self, draft: &NewNotification) -> Result<Notification> {
        let notification = self.store.create_notification(draft)?;
        metrics::record_notification_emitted(notification.notification_type.as_str());
        debug!(
            "Emitted {} notification {} for {:?} {:?} (user {})",
            notification.notification_type.as_str(),
            notification.id,
            notification.ref_model,
            notification.related_id,
            notification.user_id
        );
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn target(kind: EntityKind, priority: Priority) -> ReminderTarget {
        ReminderTarget {
            kind,
            id: 12,
            owner_id: 3,
            title: "Thesis draft".to_string(),
            priority,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_compose_task_due_soon() {
        let draft = NotificationEmitter::compose(
            &target(EntityKind::Task, Priority::High),
            &Reminder::TaskDueSoon { minutes_left: 42 },
            now(),
        );

        assert_eq!(draft.notification_type, NotificationType::Task);
        assert_eq!(draft.priority, NotificationPriority::High);
        assert_eq!(draft.title, "Task Due Soon");
        assert_eq!(draft.message, "\"Thesis draft\" is due in 42 minutes.");
        assert_eq!(draft.related_id, Some(12));
        assert_eq!(draft.ref_model, Some(RefModel::Task));
        assert_eq!(draft.user_id, 3);
        assert_eq!(draft.delivery_date, now().timestamp_millis());
    }

    #[test]
    fn test_compose_task_overdue_is_always_high() {
        let draft = NotificationEmitter::compose(
            &target(EntityKind::Task, Priority::Low),
            &Reminder::TaskOverdue,
            now(),
        );
        assert_eq!(draft.priority, NotificationPriority::High);
        assert_eq!(draft.message, "\"Thesis draft\" is now overdue.");
    }

    #[test]
    fn test_compose_event_reminder() {
        let draft = NotificationEmitter::compose(
            &target(EntityKind::CalendarEvent, Priority::Medium),
            &Reminder::EventStarting { minutes_until: 1 },
            now(),
        );
        assert_eq!(draft.notification_type, NotificationType::Calendar);
        assert_eq!(draft.priority, NotificationPriority::Normal);
        assert_eq!(draft.ref_model, Some(RefModel::Calendar));
        assert_eq!(draft.message, "\"Thesis draft\" is starting in 1 minute.");
    }

    #[test]
    fn test_compose_goal_reminders() {
        let approaching = NotificationEmitter::compose(
            &target(EntityKind::Goal, Priority::Medium),
            &Reminder::GoalApproaching { days_left: 3 },
            now(),
        );
        assert_eq!(approaching.notification_type, NotificationType::Goal);
        assert_eq!(approaching.priority, NotificationPriority::Normal);
        assert_eq!(
            approaching.message,
            "\"Thesis draft\" has 3 days remaining to complete."
        );

        let missed = NotificationEmitter::compose(
            &target(EntityKind::Goal, Priority::Low),
            &Reminder::GoalMissed,
            now(),
        );
        assert_eq!(missed.title, "Goal Deadline Missed");
        assert_eq!(missed.priority, NotificationPriority::High);
    }

    #[test]
    fn test_reminder_condition_mapping() {
        assert_eq!(
            Reminder::GoalApproaching { days_left: 2 }.condition(),
            ReminderCondition::GoalApproaching
        );
        assert_eq!(
            Reminder::EventStarting { minutes_until: 5 }
                .condition()
                .entity_kind(),
            EntityKind::CalendarEvent
        );
    }

    #[test]
    fn test_deliver_persists_notification() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(
            crate::tracker_store::SqliteTrackerStore::new(temp_dir.path().join("tracker.db"))
                .unwrap(),
        );
        let emitter = NotificationEmitter::new(store.clone());

        let draft = NotificationEmitter::compose(
            &target(EntityKind::Task, Priority::Medium),
            &Reminder::TaskOverdue,
            now(),
        );
        let notification = emitter.deliver(&draft).unwrap();
        assert_eq!(notification.message, draft.message);
        assert!(!notification.is_read);
        assert_eq!(notification.user_id, 3);

        let stored = store.get_user_notifications(3).unwrap();
        assert_eq!(stored, vec![notification]);
    }
}
