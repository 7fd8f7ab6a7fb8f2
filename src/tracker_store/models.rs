//! Task, calendar event and goal models as seen by the reminder engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type EntityId = i64;
pub type UserId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task cannot move from {from} to {to}")]
    Task { from: TaskStatus, to: TaskStatus },
    #[error("goal cannot move from {from} to {to}")]
    Goal { from: GoalStatus, to: GoalStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in-progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "overdue" => Some(TaskStatus::Overdue),
            _ => None,
        }
    }

    /// Legal transitions. Overdue tasks can only be completed; reopening a
    /// completed task puts it back to pending or in-progress.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Pending)
                | (Pending, Completed)
                | (InProgress, Completed)
                | (Pending, Overdue)
                | (InProgress, Overdue)
                | (Overdue, Completed)
                | (Completed, Pending)
                | (Completed, InProgress)
        )
    }

    pub fn transition_to(self, next: TaskStatus) -> Result<TaskStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::Task {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::NotStarted => "not-started",
            GoalStatus::InProgress => "in-progress",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not-started" => Some(GoalStatus::NotStarted),
            "in-progress" => Some(GoalStatus::InProgress),
            "completed" => Some(GoalStatus::Completed),
            "abandoned" => Some(GoalStatus::Abandoned),
            _ => None,
        }
    }

    /// Completed and abandoned goals no longer produce deadline reminders.
    pub fn is_resolved(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Abandoned)
    }

    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        use GoalStatus::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (NotStarted, Completed)
                | (NotStarted, Abandoned)
                | (InProgress, Completed)
                | (InProgress, Abandoned)
                | (Completed, InProgress)
                | (Abandoned, NotStarted)
                | (Abandoned, InProgress)
        )
    }

    pub fn transition_to(self, next: GoalStatus) -> Result<GoalStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::Goal {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which collection an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    CalendarEvent,
    Goal,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::CalendarEvent => "calendar_event",
            EntityKind::Goal => "goal",
        }
    }
}

/// A time-based condition that can produce a reminder.
///
/// Each condition owns one bit of the entity's fired-conditions mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderCondition {
    TaskDueSoon,
    TaskOverdue,
    EventStarting,
    GoalApproaching,
    GoalMissed,
}

impl ReminderCondition {
    pub fn bit(&self) -> u32 {
        match self {
            ReminderCondition::TaskDueSoon => 1 << 0,
            ReminderCondition::TaskOverdue => 1 << 1,
            ReminderCondition::EventStarting => 1 << 2,
            ReminderCondition::GoalApproaching => 1 << 3,
            ReminderCondition::GoalMissed => 1 << 4,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ReminderCondition::TaskDueSoon | ReminderCondition::TaskOverdue => EntityKind::Task,
            ReminderCondition::EventStarting => EntityKind::CalendarEvent,
            ReminderCondition::GoalApproaching | ReminderCondition::GoalMissed => EntityKind::Goal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderCondition::TaskDueSoon => "task_due_soon",
            ReminderCondition::TaskOverdue => "task_overdue",
            ReminderCondition::EventStarting => "event_starting",
            ReminderCondition::GoalApproaching => "goal_approaching",
            ReminderCondition::GoalMissed => "goal_missed",
        }
    }
}

/// Set of conditions that already produced a reminder for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FiredConditions(u32);

impl FiredConditions {
    pub const fn empty() -> Self {
        FiredConditions(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        FiredConditions(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, condition: ReminderCondition) -> bool {
        self.0 & condition.bit() != 0
    }

    pub fn intersects(&self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    pub fn with(self, condition: ReminderCondition) -> Self {
        FiredConditions(self.0 | condition.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Legacy single-flag view: true once any condition has fired.
    pub fn notification_sent(&self) -> bool {
        !self.is_empty()
    }
}

/// Atomic "mark as fired" request.
///
/// Sets `condition`'s bit on the entity, but only if none of the bits in
/// `guard_mask` are set yet. The guard always includes the condition itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub condition: ReminderCondition,
    pub guard_mask: u32,
}

impl Claim {
    pub fn new(entity_id: EntityId, condition: ReminderCondition) -> Self {
        Self {
            kind: condition.entity_kind(),
            entity_id,
            condition,
            guard_mask: condition.bit(),
        }
    }

    /// Also fail the claim if any of `others` has already fired.
    pub fn guarded_by(mut self, others: &[ReminderCondition]) -> Self {
        for other in others {
            self.guard_mask |= other.bit();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: EntityId,
    pub owner_id: UserId,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub fired: FiredConditions,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn notification_sent(&self) -> bool {
        self.fired.notification_sent()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub owner_id: UserId,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: EntityId,
    pub owner_id: UserId,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Minutes before `start_date` at which the reminder becomes due.
    /// Zero means "use the default".
    pub reminder_minutes: u32,
    pub fired: FiredConditions,
    pub created_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn notification_sent(&self) -> bool {
        self.fired.notification_sent()
    }

    /// Reminder lead time actually applied, with an unset (zero) lead
    /// falling back to [`DEFAULT_REMINDER_MINUTES`].
    pub fn lead_minutes(&self) -> u32 {
        if self.reminder_minutes == 0 {
            DEFAULT_REMINDER_MINUTES
        } else {
            self.reminder_minutes
        }
    }
}

pub const DEFAULT_REMINDER_MINUTES: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct NewCalendarEvent {
    pub owner_id: UserId,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub reminder_minutes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: EntityId,
    pub owner_id: UserId,
    pub title: String,
    pub target_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: GoalStatus,
    pub fired: FiredConditions,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub owner_id: UserId,
    pub title: String,
    pub target_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: GoalStatus,
}
