//! Store adapters for the entities the reminder jobs scan.

mod models;
mod schema;
mod sqlite_tracker_store;

pub use models::*;
pub use schema::TRACKER_VERSIONED_SCHEMAS;
pub use sqlite_tracker_store::SqliteTrackerStore;

use crate::notifications::NotificationStore;
use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait TaskStore: Send + Sync {
    fn create_task(&self, task: &NewTask) -> Result<EntityId>;
    fn get_task(&self, id: EntityId) -> Result<Option<Task>>;

    /// Non-completed tasks with `from <= due_date <= to` and none of `unfired_mask` set.
    fn find_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<Task>>;

    /// Tasks due strictly before `before` that are neither completed nor overdue,
    /// with none of `unfired_mask` set.
    fn find_overdue_tasks(&self, before: DateTime<Utc>, unfired_mask: u32) -> Result<Vec<Task>>;

    /// Unconditional status write. Callers are responsible for checking the
    /// transition is legal.
    fn set_task_status(&self, id: EntityId, status: TaskStatus) -> Result<()>;

    /// Checked status change, fails on an illegal transition or unknown task.
    fn update_task_status(&self, id: EntityId, status: TaskStatus) -> Result<Task>;

    /// Clears every fired reminder condition, e.g. after the due date was edited.
    fn reset_task_reminders(&self, id: EntityId) -> Result<()>;
}

pub trait EventStore: Send + Sync {
    fn create_event(&self, event: &NewCalendarEvent) -> Result<EntityId>;
    fn get_event(&self, id: EntityId) -> Result<Option<CalendarEvent>>;

    /// Events that have not started yet but whose reminder window has opened
    /// (`start_date - reminder_time <= now < start_date`), with none of
    /// `unfired_mask` set.
    fn find_events_in_reminder_window(
        &self,
        now: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<CalendarEvent>>;

    fn reset_event_reminder(&self, id: EntityId) -> Result<()>;
}

pub trait GoalStore: Send + Sync {
    fn create_goal(&self, goal: &NewGoal) -> Result<EntityId>;
    fn get_goal(&self, id: EntityId) -> Result<Option<Goal>>;

    /// Unresolved goals with `target_date <= until`, with none of `unfired_mask`
    /// set. A zero mask disables the fired filter.
    fn find_open_goals_due_before(
        &self,
        until: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<Goal>>;

    fn update_goal_status(&self, id: EntityId, status: GoalStatus) -> Result<Goal>;
}

pub trait ClaimStore: Send + Sync {
    /// Atomically marks `claim.condition` as fired. Returns true only for the
    /// single caller that performed the transition.
    fn claim(&self, claim: &Claim) -> Result<bool>;
}

/// Everything a reminder job needs from storage.
pub trait FullTrackerStore:
    TaskStore + EventStore + GoalStore + ClaimStore + NotificationStore
{
}

impl<T: TaskStore + EventStore + GoalStore + ClaimStore + NotificationStore> FullTrackerStore
    for T
{
}
