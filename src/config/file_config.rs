use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,
    pub job_deadline_secs: Option<u64>,

    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub task_reminders: Option<TaskReminderJobConfig>,
    pub event_reminders: Option<EventReminderJobConfig>,
    pub goal_deadlines: Option<GoalDeadlineJobConfig>,
    pub run_history_cleanup: Option<RunHistoryCleanupJobConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TaskReminderJobConfig {
    pub interval_minutes: Option<u64>,
    /// "shared" or "per_condition"
    pub dedup_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EventReminderJobConfig {
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GoalDeadlineJobConfig {
    /// Six-field cron expression, seconds first, evaluated in UTC.
    pub cron: Option<String>,
    /// "repeat_until_resolved" or "fire_once"
    pub policy: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RunHistoryCleanupJobConfig {
    pub interval_hours: Option<u64>,
    pub retention_days: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
db_dir = "/var/lib/stutrack"
metrics_port = 9200
job_deadline_secs = 300

[background_jobs.task_reminders]
interval_minutes = 30
dedup_policy = "per_condition"

[background_jobs.event_reminders]
interval_minutes = 5

[background_jobs.goal_deadlines]
cron = "0 30 7 * * *"
policy = "fire_once"

[background_jobs.run_history_cleanup]
retention_days = 14
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_dir.as_deref(), Some("/var/lib/stutrack"));
        assert_eq!(config.metrics_port, Some(9200));
        assert_eq!(config.job_deadline_secs, Some(300));

        let jobs = config.background_jobs.unwrap();
        let tasks = jobs.task_reminders.unwrap();
        assert_eq!(tasks.interval_minutes, Some(30));
        assert_eq!(tasks.dedup_policy.as_deref(), Some("per_condition"));
        assert_eq!(jobs.event_reminders.unwrap().interval_minutes, Some(5));
        let goals = jobs.goal_deadlines.unwrap();
        assert_eq!(goals.cron.as_deref(), Some("0 30 7 * * *"));
        assert_eq!(goals.policy.as_deref(), Some("fire_once"));
        let cleanup = jobs.run_history_cleanup.unwrap();
        assert_eq!(cleanup.retention_days, Some(14));
        assert_eq!(cleanup.interval_hours, None);
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.background_jobs.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = FileConfig::load(Path::new("/nonexistent/stutrack.toml"));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "metrics_port = \"not a number\"").unwrap();
        let result = FileConfig::load(file.path());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }
}
