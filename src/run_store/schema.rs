//! SQLite schema for the run history database. Timestamps are unix milliseconds.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// One row per reminder run, with its summary as JSON once finished
const JOB_RUNS_TABLE: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer, non_null = true),
        sqlite_column!("finished_at", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("summary", &SqlType::Text),
    ],
    indices: &[
        ("idx_job_runs_job_id_started", "job_id, started_at DESC"),
        ("idx_job_runs_status", "status"),
    ],
};

/// Next run time per job, so restarts keep the cadence
const JOB_SCHEDULE_TABLE: Table = Table {
    name: "job_schedule",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("next_run_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const RUN_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOB_RUNS_TABLE, JOB_SCHEDULE_TABLE],
    migration: None,
}];
