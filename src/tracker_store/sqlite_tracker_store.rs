use super::models::*;
use super::schema::TRACKER_VERSIONED_SCHEMAS;
use super::{ClaimStore, EventStore, GoalStore, TaskStore};
use crate::notifications::{
    NewNotification, Notification, NotificationPriority, NotificationStore, NotificationType,
    RefModel,
};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

const TASK_COLUMNS: &str = "id, owner_id, title, due_date, priority, status, fired_conditions, created_at";
const EVENT_COLUMNS: &str =
    "id, owner_id, title, start_date, end_date, reminder_time, fired_conditions, created_at";
const GOAL_COLUMNS: &str =
    "id, owner_id, title, target_date, priority, status, fired_conditions, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, notification_type, related_id, ref_model, priority, is_read, delivery_date, created_at";

/// SQLite-backed tracker store.
///
/// Several instances (or processes) may open the same file; claims stay
/// race-free because each one is a single conditional UPDATE.
#[derive(Clone)]
pub struct SqliteTrackerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), TRACKER_VERSIONED_SCHEMAS, "tracker")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn table_for(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Task => "tasks",
            EntityKind::CalendarEvent => "calendar_events",
            EntityKind::Goal => "goals",
        }
    }

    fn to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    fn malformed(column: usize, what: &str, value: &str) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            format!("invalid {}: {:?}", what, value).into(),
        )
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let priority_str: String = row.get("priority")?;
        let status_str: String = row.get("status")?;
        Ok(Task {
            id: row.get("id")?,
            owner_id: row.get::<_, i64>("owner_id")? as UserId,
            title: row.get("title")?,
            due_date: row.get::<_, Option<i64>>("due_date")?.map(Self::from_millis),
            priority: Priority::parse(&priority_str)
                .ok_or_else(|| Self::malformed(4, "priority", &priority_str))?,
            status: TaskStatus::parse(&status_str)
                .ok_or_else(|| Self::malformed(5, "task status", &status_str))?,
            fired: FiredConditions::from_bits(row.get::<_, i64>("fired_conditions")? as u32),
            created_at: Self::from_millis(row.get("created_at")?),
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<CalendarEvent> {
        Ok(CalendarEvent {
            id: row.get("id")?,
            owner_id: row.get::<_, i64>("owner_id")? as UserId,
            title: row.get("title")?,
            start_date: Self::from_millis(row.get("start_date")?),
            end_date: row.get::<_, Option<i64>>("end_date")?.map(Self::from_millis),
            reminder_minutes: row.get::<_, i64>("reminder_time")?.max(0) as u32,
            fired: FiredConditions::from_bits(row.get::<_, i64>("fired_conditions")? as u32),
            created_at: Self::from_millis(row.get("created_at")?),
        })
    }

    fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        let priority_str: String = row.get("priority")?;
        let status_str: String = row.get("status")?;
        Ok(Goal {
            id: row.get("id")?,
            owner_id: row.get::<_, i64>("owner_id")? as UserId,
            title: row.get("title")?,
            target_date: row.get::<_, Option<i64>>("target_date")?.map(Self::from_millis),
            priority: Priority::parse(&priority_str)
                .ok_or_else(|| Self::malformed(4, "priority", &priority_str))?,
            status: GoalStatus::parse(&status_str)
                .ok_or_else(|| Self::malformed(5, "goal status", &status_str))?,
            fired: FiredConditions::from_bits(row.get::<_, i64>("fired_conditions")? as u32),
            created_at: Self::from_millis(row.get("created_at")?),
        })
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let type_str: String = row.get("notification_type")?;
        let priority_str: String = row.get("priority")?;
        let ref_model_str: Option<String> = row.get("ref_model")?;
        let ref_model = match ref_model_str {
            Some(s) => Some(RefModel::parse(&s).ok_or_else(|| Self::malformed(6, "ref model", &s))?),
            None => None,
        };
        Ok(Notification {
            id: row.get("id")?,
            user_id: row.get::<_, i64>("user_id")? as UserId,
            title: row.get("title")?,
            message: row.get("message")?,
            notification_type: NotificationType::parse(&type_str)
                .ok_or_else(|| Self::malformed(4, "notification type", &type_str))?,
            related_id: row.get("related_id")?,
            ref_model,
            priority: NotificationPriority::parse(&priority_str)
                .ok_or_else(|| Self::malformed(7, "notification priority", &priority_str))?,
            is_read: row.get::<_, i64>("is_read")? != 0,
            delivery_date: row.get("delivery_date")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Collects query rows, logging and dropping rows whose values cannot be decoded.
    fn skip_malformed<T>(
        rows: impl Iterator<Item = rusqlite::Result<T>>,
        entity: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for row in rows {
            match row {
                Ok(item) => items.push(item),
                Err(e @ rusqlite::Error::FromSqlConversionFailure(..))
                | Err(e @ rusqlite::Error::InvalidColumnType(..)) => {
                    warn!("Skipping malformed {} row: {}", entity, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(items)
    }

    fn query_task(conn: &Connection, id: EntityId) -> Result<Option<Task>> {
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn query_goal(conn: &Connection, id: EntityId) -> Result<Option<Goal>> {
        let goal = conn
            .query_row(
                &format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS),
                params![id],
                Self::row_to_goal,
            )
            .optional()?;
        Ok(goal)
    }

    fn query_notification(conn: &Connection, id: &str) -> Result<Option<Notification>> {
        let notification = conn
            .query_row(
                &format!(
                    "SELECT {} FROM notifications WHERE id = ?1",
                    NOTIFICATION_COLUMNS
                ),
                params![id],
                Self::row_to_notification,
            )
            .optional()?;
        Ok(notification)
    }
}

impl TaskStore for SqliteTrackerStore {
    fn create_task(&self, task: &NewTask) -> Result<EntityId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks (owner_id, title, due_date, priority, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.owner_id as i64,
                task.title,
                task.due_date.as_ref().map(Self::to_millis),
                task.priority.as_str(),
                task.status.as_str(),
                Utc::now().timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to create task {:?}", task.title))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_task(&self, id: EntityId) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        Self::query_task(&conn, id)
    }

    fn find_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE due_date IS NOT NULL AND due_date >= ?1 AND due_date <= ?2
               AND status != ?3 AND (fired_conditions & ?4) = 0
             ORDER BY due_date ASC, id ASC",
            TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                Self::to_millis(&from),
                Self::to_millis(&to),
                TaskStatus::Completed.as_str(),
                unfired_mask as i64
            ],
            Self::row_to_task,
        )?;
        Self::skip_malformed(rows, "task")
    }

    fn find_overdue_tasks(&self, before: DateTime<Utc>, unfired_mask: u32) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE due_date IS NOT NULL AND due_date < ?1
               AND status NOT IN (?2, ?3) AND (fired_conditions & ?4) = 0
             ORDER BY due_date ASC, id ASC",
            TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                Self::to_millis(&before),
                TaskStatus::Completed.as_str(),
                TaskStatus::Overdue.as_str(),
                unfired_mask as i64
            ],
            Self::row_to_task,
        )?;
        Self::skip_malformed(rows, "task")
    }

    fn set_task_status(&self, id: EntityId, status: TaskStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            bail!("Task {} not found", id);
        }
        Ok(())
    }

    fn update_task_status(&self, id: EntityId, status: TaskStatus) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let current = Self::query_task(&conn, id)?
            .with_context(|| format!("Task {} not found", id))?;
        current.status.transition_to(status)?;

        let changed = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status.as_str(), id, current.status.as_str()],
        )?;
        if changed == 0 {
            bail!("Task {} status changed concurrently", id);
        }
        Self::query_task(&conn, id)?.with_context(|| format!("Task {} not found", id))
    }

    fn reset_task_reminders(&self, id: EntityId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET fired_conditions = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

impl EventStore for SqliteTrackerStore {
    fn create_event(&self, event: &NewCalendarEvent) -> Result<EntityId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO calendar_events (owner_id, title, start_date, end_date, reminder_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.owner_id as i64,
                event.title,
                Self::to_millis(&event.start_date),
                event.end_date.as_ref().map(Self::to_millis),
                event.reminder_minutes as i64,
                Utc::now().timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to create event {:?}", event.title))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_event(&self, id: EntityId) -> Result<Option<CalendarEvent>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                &format!("SELECT {} FROM calendar_events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                Self::row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    fn find_events_in_reminder_window(
        &self,
        now: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<CalendarEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM calendar_events
             WHERE start_date > ?1
               AND start_date - (CASE WHEN reminder_time > 0 THEN reminder_time ELSE ?3 END) * 60000 <= ?1
               AND (fired_conditions & ?2) = 0
             ORDER BY start_date ASC, id ASC",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                Self::to_millis(&now),
                unfired_mask as i64,
                DEFAULT_REMINDER_MINUTES as i64
            ],
            Self::row_to_event,
        )?;
        Self::skip_malformed(rows, "calendar event")
    }

    fn reset_event_reminder(&self, id: EntityId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calendar_events SET fired_conditions = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

impl GoalStore for SqliteTrackerStore {
    fn create_goal(&self, goal: &NewGoal) -> Result<EntityId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO goals (owner_id, title, target_date, priority, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                goal.owner_id as i64,
                goal.title,
                goal.target_date.as_ref().map(Self::to_millis),
                goal.priority.as_str(),
                goal.status.as_str(),
                Utc::now().timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to create goal {:?}", goal.title))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_goal(&self, id: EntityId) -> Result<Option<Goal>> {
        let conn = self.conn.lock().unwrap();
        Self::query_goal(&conn, id)
    }

    fn find_open_goals_due_before(
        &self,
        until: DateTime<Utc>,
        unfired_mask: u32,
    ) -> Result<Vec<Goal>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM goals
             WHERE target_date IS NOT NULL AND target_date <= ?1
               AND status NOT IN (?2, ?3) AND (fired_conditions & ?4) = 0
             ORDER BY target_date ASC, id ASC",
            GOAL_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                Self::to_millis(&until),
                GoalStatus::Completed.as_str(),
                GoalStatus::Abandoned.as_str(),
                unfired_mask as i64
            ],
            Self::row_to_goal,
        )?;
        Self::skip_malformed(rows, "goal")
    }

    fn update_goal_status(&self, id: EntityId, status: GoalStatus) -> Result<Goal> {
        let conn = self.conn.lock().unwrap();
        let current = Self::query_goal(&conn, id)?
            .with_context(|| format!("Goal {} not found", id))?;
        current.status.transition_to(status)?;

        let changed = conn.execute(
            "UPDATE goals SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status.as_str(), id, current.status.as_str()],
        )?;
        if changed == 0 {
            bail!("Goal {} status changed concurrently", id);
        }
        Self::query_goal(&conn, id)?.with_context(|| format!("Goal {} not found", id))
    }
}

impl ClaimStore for SqliteTrackerStore {
    fn claim(&self, claim: &Claim) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET fired_conditions = fired_conditions | ?1
                     WHERE id = ?2 AND (fired_conditions & ?3) = 0",
                    Self::table_for(claim.kind)
                ),
                params![
                    claim.condition.bit() as i64,
                    claim.entity_id,
                    claim.guard_mask as i64
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to claim {} for {} {}",
                    claim.condition.as_str(),
                    claim.kind.as_str(),
                    claim.entity_id
                )
            })?;
        Ok(changed == 1)
    }
}

impl NotificationStore for SqliteTrackerStore {
    fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp_millis();

        conn.execute(
            &format!(
                "INSERT INTO notifications ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
                NOTIFICATION_COLUMNS
            ),
            params![
                id,
                notification.user_id as i64,
                notification.title,
                notification.message,
                notification.notification_type.as_str(),
                notification.related_id,
                notification.ref_model.map(|r| r.as_str()),
                notification.priority.as_str(),
                notification.delivery_date,
                created_at
            ],
        )
        .context("Failed to insert notification")?;

        Ok(Notification {
            id,
            user_id: notification.user_id,
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            message: notification.message.clone(),
            related_id: notification.related_id,
            ref_model: notification.ref_model,
            priority: notification.priority,
            is_read: false,
            delivery_date: notification.delivery_date,
            created_at,
        })
    }

    fn get_user_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            NOTIFICATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id as i64], Self::row_to_notification)?;
        Self::skip_malformed(rows, "notification")
    }

    fn get_notifications_for(
        &self,
        ref_model: RefModel,
        related_id: EntityId,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE ref_model = ?1 AND related_id = ?2
             ORDER BY created_at ASC, rowid ASC",
            NOTIFICATION_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![ref_model.as_str(), related_id],
            Self::row_to_notification,
        )?;
        Self::skip_malformed(rows, "notification")
    }

    fn mark_notification_read(
        &self,
        notification_id: &str,
        user_id: UserId,
    ) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id as i64],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::query_notification(&conn, notification_id)
    }

    fn get_unread_count(&self, user_id: UserId) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id as i64],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Barrier;
    use std::thread;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteTrackerStore,
        temp_dir: TempDir,
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteTrackerStore::new(temp_dir.path().join("tracker.db")).unwrap();
        TestStore { store, temp_dir }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn new_task(title: &str, due_date: Option<DateTime<Utc>>, status: TaskStatus) -> NewTask {
        NewTask {
            owner_id: 1,
            title: title.to_string(),
            due_date,
            priority: Priority::Medium,
            status,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<EntityId> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_create_and_get_task() {
        let test = create_test_store();
        let store = &test.store;

        let due = now() + Duration::minutes(30);
        let id = store
            .create_task(&NewTask {
                owner_id: 5,
                title: "Lab report".to_string(),
                due_date: Some(due),
                priority: Priority::High,
                status: TaskStatus::InProgress,
            })
            .unwrap();

        let task = store.get_task(id).unwrap().unwrap();
        assert_eq!(task.owner_id, 5);
        assert_eq!(task.title, "Lab report");
        assert_eq!(task.due_date, Some(due));
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(!task.notification_sent());

        assert!(store.get_task(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_find_tasks_due_between_bounds_are_inclusive() {
        let test = create_test_store();
        let store = &test.store;
        let horizon = now() + Duration::hours(1);

        let at_now = store
            .create_task(&new_task("now", Some(now()), TaskStatus::Pending))
            .unwrap();
        let at_horizon = store
            .create_task(&new_task("edge", Some(horizon), TaskStatus::InProgress))
            .unwrap();
        store
            .create_task(&new_task(
                "past",
                Some(now() - Duration::seconds(1)),
                TaskStatus::Pending,
            ))
            .unwrap();
        store
            .create_task(&new_task(
                "later",
                Some(horizon + Duration::seconds(1)),
                TaskStatus::Pending,
            ))
            .unwrap();
        store
            .create_task(&new_task(
                "done",
                Some(now() + Duration::minutes(5)),
                TaskStatus::Completed,
            ))
            .unwrap();
        store
            .create_task(&new_task("undated", None, TaskStatus::Pending))
            .unwrap();

        let found = store
            .find_tasks_due_between(now(), horizon, ReminderCondition::TaskDueSoon.bit())
            .unwrap();
        assert_eq!(ids(&found), vec![at_now, at_horizon]);
    }

    #[test]
    fn test_find_overdue_tasks_skips_resolved_statuses() {
        let test = create_test_store();
        let store = &test.store;
        let past = Some(now() - Duration::hours(2));

        let pending = store
            .create_task(&new_task("pending", past, TaskStatus::Pending))
            .unwrap();
        store
            .create_task(&new_task("overdue", past, TaskStatus::Overdue))
            .unwrap();
        store
            .create_task(&new_task("completed", past, TaskStatus::Completed))
            .unwrap();
        store
            .create_task(&new_task("exact", Some(now()), TaskStatus::Pending))
            .unwrap();

        let found = store
            .find_overdue_tasks(now(), ReminderCondition::TaskOverdue.bit())
            .unwrap();
        assert_eq!(ids(&found), vec![pending]);
    }

    #[test]
    fn test_claim_succeeds_once() {
        let test = create_test_store();
        let store = &test.store;
        let id = store
            .create_task(&new_task("once", Some(now()), TaskStatus::Pending))
            .unwrap();

        let claim = Claim::new(id, ReminderCondition::TaskOverdue);
        assert!(store.claim(&claim).unwrap());
        assert!(!store.claim(&claim).unwrap());

        let task = store.get_task(id).unwrap().unwrap();
        assert!(task.fired.contains(ReminderCondition::TaskOverdue));
        assert!(task.notification_sent());
    }

    #[test]
    fn test_claim_guard_blocks_sibling_condition() {
        let test = create_test_store();
        let store = &test.store;
        let id = store
            .create_task(&new_task("shared", Some(now()), TaskStatus::Pending))
            .unwrap();

        let both = [ReminderCondition::TaskDueSoon, ReminderCondition::TaskOverdue];
        assert!(store
            .claim(&Claim::new(id, ReminderCondition::TaskDueSoon).guarded_by(&both))
            .unwrap());
        assert!(!store
            .claim(&Claim::new(id, ReminderCondition::TaskOverdue).guarded_by(&both))
            .unwrap());

        // Without the guard the overdue condition is independent
        assert!(store
            .claim(&Claim::new(id, ReminderCondition::TaskOverdue))
            .unwrap());
    }

    #[test]
    fn test_claim_unknown_entity_returns_false() {
        let test = create_test_store();
        assert!(!test
            .store
            .claim(&Claim::new(404, ReminderCondition::EventStarting))
            .unwrap());
    }

    #[test]
    fn test_concurrent_claims_have_single_winner() {
        let test = create_test_store();
        let id = test
            .store
            .create_task(&new_task("race", Some(now()), TaskStatus::Pending))
            .unwrap();

        // A second connection to the same file behaves like another process
        let other = SqliteTrackerStore::new(test.temp_dir.path().join("tracker.db")).unwrap();

        let threads = 12;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let store = if i % 2 == 0 {
                    test.store.clone()
                } else {
                    other.clone()
                };
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .claim(&Claim::new(id, ReminderCondition::TaskDueSoon))
                        .unwrap()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_set_task_status_unknown_task_fails() {
        let test = create_test_store();
        assert!(test.store.set_task_status(9, TaskStatus::Overdue).is_err());
    }

    #[test]
    fn test_update_task_status_enforces_transitions() {
        let test = create_test_store();
        let store = &test.store;
        let id = store
            .create_task(&new_task("fsm", Some(now()), TaskStatus::Pending))
            .unwrap();

        store.set_task_status(id, TaskStatus::Overdue).unwrap();

        let err = store
            .update_task_status(id, TaskStatus::Pending)
            .unwrap_err();
        assert!(err.to_string().contains("overdue to pending"));

        let task = store.update_task_status(id, TaskStatus::Completed).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_reset_task_reminders_allows_new_claim() {
        let test = create_test_store();
        let store = &test.store;
        let id = store
            .create_task(&new_task("edited", Some(now()), TaskStatus::Pending))
            .unwrap();
        let claim = Claim::new(id, ReminderCondition::TaskDueSoon);

        assert!(store.claim(&claim).unwrap());
        store.reset_task_reminders(id).unwrap();
        assert!(!store.get_task(id).unwrap().unwrap().notification_sent());
        assert!(store.claim(&claim).unwrap());
    }

    #[test]
    fn test_malformed_task_rows_are_skipped() {
        let test = create_test_store();
        let store = &test.store;
        let good = store
            .create_task(&new_task("good", Some(now() - Duration::hours(1)), TaskStatus::Pending))
            .unwrap();
        let bad = store
            .create_task(&new_task("bad", Some(now() - Duration::hours(1)), TaskStatus::Pending))
            .unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE tasks SET status = 'someday' WHERE id = ?1",
                params![bad],
            )
            .unwrap();

        let found = store.find_overdue_tasks(now(), 0).unwrap();
        assert_eq!(ids(&found), vec![good]);
    }

    #[test]
    fn test_find_events_in_reminder_window() {
        let test = create_test_store();
        let store = &test.store;
        let event = |title: &str, start: DateTime<Utc>| NewCalendarEvent {
            owner_id: 2,
            title: title.to_string(),
            start_date: start,
            end_date: Some(start + Duration::hours(1)),
            reminder_minutes: DEFAULT_REMINDER_MINUTES,
        };

        let inside = store
            .create_event(&event("inside", now() + Duration::minutes(29)))
            .unwrap();
        let edge = store
            .create_event(&event("edge", now() + Duration::minutes(30)))
            .unwrap();
        store
            .create_event(&event("outside", now() + Duration::minutes(31)))
            .unwrap();
        store.create_event(&event("started", now())).unwrap();

        let found: Vec<_> = store
            .find_events_in_reminder_window(now(), ReminderCondition::EventStarting.bit())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(found, vec![inside, edge]);

        let stored = store.get_event(inside).unwrap().unwrap();
        assert_eq!(stored.reminder_minutes, 30);
        assert_eq!(stored.end_date, Some(now() + Duration::minutes(89)));
    }

    #[test]
    fn test_zero_reminder_time_uses_default_window() {
        let test = create_test_store();
        let store = &test.store;
        let event = |title: &str, start: DateTime<Utc>| NewCalendarEvent {
            owner_id: 2,
            title: title.to_string(),
            start_date: start,
            end_date: None,
            reminder_minutes: 0,
        };

        let soon = store
            .create_event(&event("soon", now() + Duration::minutes(10)))
            .unwrap();
        store
            .create_event(&event("later", now() + Duration::minutes(45)))
            .unwrap();

        let found: Vec<_> = store
            .find_events_in_reminder_window(now(), ReminderCondition::EventStarting.bit())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(found, vec![soon]);

        let stored = store.get_event(soon).unwrap().unwrap();
        assert_eq!(stored.reminder_minutes, 0);
        assert_eq!(stored.lead_minutes(), DEFAULT_REMINDER_MINUTES);
    }

    #[test]
    fn test_find_open_goals_due_before() {
        let test = create_test_store();
        let store = &test.store;
        let goal = |title: &str, target: Option<DateTime<Utc>>, status: GoalStatus| NewGoal {
            owner_id: 3,
            title: title.to_string(),
            target_date: target,
            priority: Priority::Low,
            status,
        };
        let week = now() + Duration::days(7);

        let missed = store
            .create_goal(&goal("missed", Some(now() - Duration::days(1)), GoalStatus::InProgress))
            .unwrap();
        let soon = store
            .create_goal(&goal("soon", Some(now() + Duration::days(3)), GoalStatus::NotStarted))
            .unwrap();
        store
            .create_goal(&goal("far", Some(week + Duration::days(1)), GoalStatus::NotStarted))
            .unwrap();
        store
            .create_goal(&goal("done", Some(now()), GoalStatus::Completed))
            .unwrap();
        store
            .create_goal(&goal("dropped", Some(now()), GoalStatus::Abandoned))
            .unwrap();

        let found: Vec<_> = store
            .find_open_goals_due_before(week, 0)
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(found, vec![missed, soon]);

        assert!(store
            .claim(&Claim::new(soon, ReminderCondition::GoalApproaching))
            .unwrap());
        let unfired: Vec<_> = store
            .find_open_goals_due_before(week, ReminderCondition::GoalApproaching.bit())
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(unfired, vec![missed]);
    }

    #[test]
    fn test_update_goal_status() {
        let test = create_test_store();
        let store = &test.store;
        let id = store
            .create_goal(&NewGoal {
                owner_id: 1,
                title: "Run 10k".to_string(),
                target_date: None,
                priority: Priority::Medium,
                status: GoalStatus::NotStarted,
            })
            .unwrap();

        let goal = store.update_goal_status(id, GoalStatus::Completed).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!(store.update_goal_status(id, GoalStatus::Abandoned).is_err());
    }

    fn draft(user_id: UserId, related_id: EntityId) -> NewNotification {
        NewNotification {
            user_id,
            notification_type: NotificationType::Task,
            title: "Task Overdue".to_string(),
            message: "\"x\" is now overdue.".to_string(),
            related_id: Some(related_id),
            ref_model: Some(RefModel::Task),
            priority: NotificationPriority::High,
            delivery_date: now().timestamp_millis(),
        }
    }

    #[test]
    fn test_notification_create_and_list() {
        let test = create_test_store();
        let store = &test.store;

        let first = store.create_notification(&draft(1, 10)).unwrap();
        let second = store.create_notification(&draft(1, 11)).unwrap();
        store.create_notification(&draft(2, 10)).unwrap();
        assert_ne!(first.id, second.id);
        assert!(!first.is_read);

        let listed = store.get_user_notifications(1).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1], first);

        let for_task = store.get_notifications_for(RefModel::Task, 10).unwrap();
        assert_eq!(for_task.len(), 2);
        assert!(store
            .get_notifications_for(RefModel::Goal, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_notification_mark_read() {
        let test = create_test_store();
        let store = &test.store;

        let notification = store.create_notification(&draft(1, 10)).unwrap();
        store.create_notification(&draft(1, 11)).unwrap();
        assert_eq!(store.get_unread_count(1).unwrap(), 2);

        // Wrong owner
        assert!(store
            .mark_notification_read(&notification.id, 2)
            .unwrap()
            .is_none());

        let updated = store
            .mark_notification_read(&notification.id, 1)
            .unwrap()
            .unwrap();
        assert!(updated.is_read);
        assert_eq!(store.get_unread_count(1).unwrap(), 1);
        assert!(store.mark_notification_read("missing", 1).unwrap().is_none());
    }

    #[test]
    fn test_reopen_existing_database() {
        let test = create_test_store();
        let id = test
            .store
            .create_task(&new_task("persisted", Some(now()), TaskStatus::Pending))
            .unwrap();
        drop(test.store);

        let reopened = SqliteTrackerStore::new(test.temp_dir.path().join("tracker.db")).unwrap();
        assert_eq!(
            reopened.get_task(id).unwrap().unwrap().title,
            "persisted".to_string()
        );
    }
}
