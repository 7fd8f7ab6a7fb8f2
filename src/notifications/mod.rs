//! Notification records produced by the reminder jobs.

mod emitter;
mod models;
mod store;

pub use emitter::{NotificationEmitter, Reminder, ReminderTarget};
pub use models::{NewNotification, Notification, NotificationPriority, NotificationType, RefModel};
pub use store::NotificationStore;
