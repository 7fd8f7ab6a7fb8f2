//! Specific background job implementations.

pub mod event_reminder;
pub mod goal_deadline;
pub mod run_history_cleanup;
pub mod task_reminder;

pub use event_reminder::EventReminderJob;
pub use goal_deadline::GoalDeadlineJob;
pub use run_history_cleanup::RunHistoryCleanupJob;
pub use task_reminder::TaskReminderJob;
