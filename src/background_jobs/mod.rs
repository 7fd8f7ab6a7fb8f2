//! Background job scheduling and execution system.
//!
//! The scheduler drives the reminder jobs on their own schedules, never
//! letting two runs of the same job overlap. Each job plans its reminders
//! from the current time and the candidates it queried, then hands the plan
//! to the shared executor in [`reminders`]. What a run did is stored with it
//! in the run history.

mod context;
mod handle;
mod job;
pub mod jobs;
pub mod reminders;
mod scheduler;
#[cfg(test)]
mod test_support;

pub use crate::run_store::RunSummary;
pub use context::JobContext;
pub use handle::SchedulerHandle;
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use reminders::ReminderAction;
pub use scheduler::{create_scheduler, JobScheduler};
