mod file_config;

pub use file_config::{
    RunHistoryCleanupJobConfig, BackgroundJobsConfig, EventReminderJobConfig, FileConfig,
    GoalDeadlineJobConfig, TaskReminderJobConfig,
};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the due-soon and overdue task reminders share their dedup marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TaskDedupPolicy {
    /// Whichever condition fires first suppresses the other.
    #[default]
    #[value(name = "shared")]
    Shared,
    /// Each condition fires once on its own.
    #[value(name = "per_condition")]
    PerCondition,
}

impl TaskDedupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskDedupPolicy::Shared => "shared",
            TaskDedupPolicy::PerCondition => "per_condition",
        }
    }
}

/// Whether goal deadline reminders repeat every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GoalReminderPolicy {
    /// Notify on every run until the goal is completed or abandoned.
    #[default]
    #[value(name = "repeat_until_resolved")]
    RepeatUntilResolved,
    /// Notify once per goal and condition.
    #[value(name = "fire_once")]
    FireOnce,
}

impl GoalReminderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalReminderPolicy::RepeatUntilResolved => "repeat_until_resolved",
            GoalReminderPolicy::FireOnce => "fire_once",
        }
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub job_deadline_secs: Option<u64>,
    pub task_reminder_interval_minutes: Option<u64>,
    pub event_reminder_interval_minutes: Option<u64>,
    pub task_dedup_policy: Option<TaskDedupPolicy>,
    pub goal_reminder_policy: Option<GoalReminderPolicy>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub metrics_port: u16,
    /// Per-run deadline for every job, None to let runs go on until done.
    pub job_deadline_secs: Option<u64>,

    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let job_deadline_secs = file
            .job_deadline_secs
            .or(cli.job_deadline_secs)
            .filter(|secs| *secs > 0);

        let bg_jobs_file = file.background_jobs.unwrap_or_default();
        let bg_jobs_defaults = BackgroundJobsSettings::default();

        // Task reminders
        let tr_file = bg_jobs_file.task_reminders.unwrap_or_default();
        let task_reminders = TaskReminderJobSettings {
            interval_minutes: tr_file
                .interval_minutes
                .or(cli.task_reminder_interval_minutes)
                .unwrap_or(bg_jobs_defaults.task_reminders.interval_minutes),
            dedup_policy: match tr_file.dedup_policy {
                Some(s) => parse_policy::<TaskDedupPolicy>("dedup_policy", &s)?,
                None => cli
                    .task_dedup_policy
                    .unwrap_or(bg_jobs_defaults.task_reminders.dedup_policy),
            },
        };
        if task_reminders.interval_minutes == 0 {
            bail!("task_reminders interval_minutes must be greater than zero");
        }

        // Event reminders
        let er_file = bg_jobs_file.event_reminders.unwrap_or_default();
        let event_reminders = EventReminderJobSettings {
            interval_minutes: er_file
                .interval_minutes
                .or(cli.event_reminder_interval_minutes)
                .unwrap_or(bg_jobs_defaults.event_reminders.interval_minutes),
        };
        if event_reminders.interval_minutes == 0 {
            bail!("event_reminders interval_minutes must be greater than zero");
        }

        // Goal deadlines
        let gd_file = bg_jobs_file.goal_deadlines.unwrap_or_default();
        let goal_deadlines = GoalDeadlineJobSettings {
            cron: gd_file
                .cron
                .unwrap_or(bg_jobs_defaults.goal_deadlines.cron),
            policy: match gd_file.policy {
                Some(s) => parse_policy::<GoalReminderPolicy>("goal_deadlines policy", &s)?,
                None => cli
                    .goal_reminder_policy
                    .unwrap_or(bg_jobs_defaults.goal_deadlines.policy),
            },
        };
        if let Err(e) = cron::Schedule::from_str(&goal_deadlines.cron) {
            bail!(
                "Invalid goal_deadlines cron expression '{}': {}",
                goal_deadlines.cron,
                e
            );
        }

        // Run history cleanup job settings (optional - only if configured)
        let run_history_cleanup = bg_jobs_file.run_history_cleanup.map(|rhc_file| {
            let rhc_defaults = RunHistoryCleanupJobSettings::default();
            RunHistoryCleanupJobSettings {
                interval_hours: rhc_file
                    .interval_hours
                    .unwrap_or(rhc_defaults.interval_hours),
                retention_days: rhc_file
                    .retention_days
                    .unwrap_or(rhc_defaults.retention_days),
            }
        });
        if run_history_cleanup
            .as_ref()
            .is_some_and(|settings| settings.interval_hours == 0)
        {
            bail!("run_history_cleanup interval_hours must be greater than zero");
        }

        Ok(Self {
            db_dir,
            metrics_port,
            job_deadline_secs,
            background_jobs: BackgroundJobsSettings {
                task_reminders,
                event_reminders,
                goal_deadlines,
                run_history_cleanup,
            },
        })
    }

    pub fn tracker_db_path(&self) -> PathBuf {
        self.db_dir.join("tracker.db")
    }

    pub fn run_db_path(&self) -> PathBuf {
        self.db_dir.join("runs.db")
    }

    pub fn job_deadline(&self) -> Option<Duration> {
        self.job_deadline_secs.map(Duration::from_secs)
    }
}

/// Settings for all background jobs
#[derive(Debug, Clone, Default)]
pub struct BackgroundJobsSettings {
    pub task_reminders: TaskReminderJobSettings,
    pub event_reminders: EventReminderJobSettings,
    pub goal_deadlines: GoalDeadlineJobSettings,
    pub run_history_cleanup: Option<RunHistoryCleanupJobSettings>,
}

/// Settings for the task reminder job
#[derive(Debug, Clone)]
pub struct TaskReminderJobSettings {
    pub interval_minutes: u64,
    pub dedup_policy: TaskDedupPolicy,
}

impl Default for TaskReminderJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            dedup_policy: TaskDedupPolicy::Shared,
        }
    }
}

/// Settings for the event reminder job
#[derive(Debug, Clone)]
pub struct EventReminderJobSettings {
    pub interval_minutes: u64,
}

impl Default for EventReminderJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
        }
    }
}

/// Settings for the goal deadline job
#[derive(Debug, Clone)]
pub struct GoalDeadlineJobSettings {
    pub cron: String,
    pub policy: GoalReminderPolicy,
}

impl Default for GoalDeadlineJobSettings {
    fn default() -> Self {
        Self {
            // Daily at midnight UTC
            cron: "0 0 0 * * *".to_string(),
            policy: GoalReminderPolicy::RepeatUntilResolved,
        }
    }
}

/// Settings for the run history cleanup job
#[derive(Debug, Clone)]
pub struct RunHistoryCleanupJobSettings {
    pub interval_hours: u64,
    pub retention_days: u64,
}

impl Default for RunHistoryCleanupJobSettings {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            retention_days: 30,
        }
    }
}

/// Parses a policy name with clap's ValueEnum, case insensitive.
fn parse_policy<T: ValueEnum>(field: &str, s: &str) -> Result<T> {
    match T::from_str(s, true) {
        Ok(value) => Ok(value),
        Err(_) => bail!("Invalid {}: {:?}", field, s),
    }
}
