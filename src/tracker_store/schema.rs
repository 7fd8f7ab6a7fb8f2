//! SQLite schema definitions for the tracker database.
//!
//! Holds the entities the reminder jobs scan (tasks, calendar events, goals)
//! and the notifications they produce. All timestamps are unix milliseconds.
//! `fired_conditions` holds one bit per reminder condition already sent.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Tasks, calendar events, goals and notifications
// =============================================================================

const TASKS_TABLE: Table = Table {
    name: "tasks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("due_date", &SqlType::Integer),
        sqlite_column!(
            "priority",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'medium'")
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "fired_conditions",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_tasks_owner", "owner_id"),
        ("idx_tasks_due_date", "due_date"),
    ],
};

const CALENDAR_EVENTS_TABLE: Table = Table {
    name: "calendar_events",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("start_date", &SqlType::Integer, non_null = true),
        sqlite_column!("end_date", &SqlType::Integer),
        sqlite_column!(
            "reminder_time",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("30")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "fired_conditions",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_calendar_events_owner", "owner_id"),
        ("idx_calendar_events_start_date", "start_date"),
    ],
};

const GOALS_TABLE: Table = Table {
    name: "goals",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("target_date", &SqlType::Integer),
        sqlite_column!(
            "priority",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'medium'")
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'not-started'")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "fired_conditions",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_goals_owner", "owner_id"),
        ("idx_goals_target_date", "target_date"),
    ],
};

const NOTIFICATIONS_TABLE: Table = Table {
    name: "notifications",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("notification_type", &SqlType::Text, non_null = true),
        sqlite_column!("related_id", &SqlType::Integer),
        sqlite_column!("ref_model", &SqlType::Text),
        sqlite_column!(
            "priority",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'normal'")
        ),
        sqlite_column!(
            "is_read",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("delivery_date", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_notifications_user_created", "user_id, created_at DESC"),
        ("idx_notifications_related", "ref_model, related_id"),
    ],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// All versioned schemas for the tracker database.
pub const TRACKER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        TASKS_TABLE,
        CALENDAR_EVENTS_TABLE,
        GOALS_TABLE,
        NOTIFICATIONS_TABLE,
    ],
    migration: None,
}];
