//! Notification data models

use crate::tracker_store::{EntityId, EntityKind, Priority, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Task,
    Calendar,
    Goal,
    System,
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Task => "task",
            NotificationType::Calendar => "calendar",
            NotificationType::Goal => "goal",
            NotificationType::System => "system",
            NotificationType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(NotificationType::Task),
            "calendar" => Some(NotificationType::Calendar),
            "goal" => Some(NotificationType::Goal),
            "system" => Some(NotificationType::System),
            "other" => Some(NotificationType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(NotificationPriority::Low),
            "normal" => Some(NotificationPriority::Normal),
            "high" => Some(NotificationPriority::High),
            _ => None,
        }
    }

    /// High-priority entities produce high-priority reminders, everything else is normal.
    pub fn from_entity_priority(priority: Priority) -> Self {
        match priority {
            Priority::High => NotificationPriority::High,
            Priority::Low | Priority::Medium => NotificationPriority::Normal,
        }
    }
}

/// Back-reference from a notification to the record it is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefModel {
    Task,
    Calendar,
    Goal,
    User,
}

impl RefModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefModel::Task => "Task",
            RefModel::Calendar => "Calendar",
            RefModel::Goal => "Goal",
            RefModel::User => "User",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Task" => Some(RefModel::Task),
            "Calendar" => Some(RefModel::Calendar),
            "Goal" => Some(RefModel::Goal),
            "User" => Some(RefModel::User),
            _ => None,
        }
    }
}

impl From<EntityKind> for RefModel {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Task => RefModel::Task,
            EntityKind::CalendarEvent => RefModel::Calendar,
            EntityKind::Goal => RefModel::Goal,
        }
    }
}

/// A notification that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<EntityId>,
    pub ref_model: Option<RefModel>,
    pub priority: NotificationPriority,
    /// Unix millis at which the notification becomes visible.
    pub delivery_date: i64,
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<EntityId>,
    pub ref_model: Option<RefModel>,
    pub priority: NotificationPriority,
    pub is_read: bool,
    pub delivery_date: i64,
    pub created_at: i64,
}
