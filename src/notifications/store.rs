//! Notification storage trait

use anyhow::Result;

use super::models::{NewNotification, Notification, RefModel};
use crate::tracker_store::{EntityId, UserId};

/// Trait for notification storage operations
pub trait NotificationStore: Send + Sync {
    /// Append a notification. Returns it with its ID and timestamps set.
    fn create_notification(&self, notification: &NewNotification) -> Result<Notification>;

    /// Get all notifications for a user, newest first.
    fn get_user_notifications(&self, user_id: UserId) -> Result<Vec<Notification>>;

    /// Get all notifications pointing back at a given record, oldest first.
    fn get_notifications_for(
        &self,
        ref_model: RefModel,
        related_id: EntityId,
    ) -> Result<Vec<Notification>>;

    /// Mark a notification as read. Returns the updated notification.
    /// Returns None if notification doesn't exist or doesn't belong to user.
    fn mark_notification_read(
        &self,
        notification_id: &str,
        user_id: UserId,
    ) -> Result<Option<Notification>>;

    /// Get count of unread notifications for a user.
    fn get_unread_count(&self, user_id: UserId) -> Result<usize>;
}
