use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a reminder run ended, or that it hasn't yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Stopped at the per-run deadline; leftovers go to the next run.
    TimedOut,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            "timed_out" => Some(RunStatus::TimedOut),
            _ => None,
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Schedule,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Schedule => "schedule",
            RunTrigger::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(RunTrigger::Schedule),
            "manual" => Some(RunTrigger::Manual),
            _ => None,
        }
    }
}

/// Counters for a single job run, stored with the run once it finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSummary {
    /// Actions planned from the store query results.
    pub candidates: usize,
    /// Claims this run won.
    pub claimed: usize,
    /// Claims someone else won first.
    pub already_claimed: usize,
    pub emitted: usize,
    /// Candidates skipped because of a store error before anything was claimed.
    pub failed: usize,
    /// Claims won whose notification could not be written.
    pub lost: usize,
    /// Old runs deleted by the history cleanup job.
    pub pruned: usize,
}

/// One row of run history.
#[derive(Debug, Clone)]
pub struct ReminderRun {
    pub id: i64,
    pub job_id: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// None while running, or when the run never reported back.
    pub summary: Option<RunSummary>,
}
