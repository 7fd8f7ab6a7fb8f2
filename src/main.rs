use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stutrack_reminders::background_jobs::jobs::{
    EventReminderJob, GoalDeadlineJob, RunHistoryCleanupJob, TaskReminderJob,
};
use stutrack_reminders::background_jobs::{create_scheduler, JobContext};
use stutrack_reminders::clock::SystemClock;
use stutrack_reminders::config::{self, GoalReminderPolicy, TaskDedupPolicy};
use stutrack_reminders::metrics;
use stutrack_reminders::notifications::NotificationEmitter;
use stutrack_reminders::run_store::SqliteRunStore;
use stutrack_reminders::tracker_store::SqliteTrackerStore;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (tracker.db, runs.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Stop a job run from picking up new candidates after this many seconds. 0 disables.
    #[clap(long)]
    pub job_deadline_secs: Option<u64>,

    /// Minutes between task reminder runs.
    #[clap(long)]
    pub task_reminder_interval_minutes: Option<u64>,

    /// Minutes between calendar event reminder runs.
    #[clap(long)]
    pub event_reminder_interval_minutes: Option<u64>,

    /// Whether the due-soon and overdue task reminders share one marker.
    #[clap(long, value_enum)]
    pub task_dedup_policy: Option<TaskDedupPolicy>,

    /// Whether goal deadline reminders repeat on every run or fire once.
    #[clap(long, value_enum)]
    pub goal_reminder_policy: Option<GoalReminderPolicy>,

    /// Run these jobs once at startup, on top of their schedule (e.g. goal_deadlines).
    #[clap(long)]
    pub run_now: Vec<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            metrics_port: args.metrics_port,
            job_deadline_secs: args.job_deadline_secs,
            task_reminder_interval_minutes: args.task_reminder_interval_minutes,
            event_reminder_interval_minutes: args.event_reminder_interval_minutes,
            task_dedup_policy: args.task_dedup_policy,
            goal_reminder_policy: args.goal_reminder_policy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;
    let jobs_config = &app_config.background_jobs;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!("  job_deadline_secs: {:?}", app_config.job_deadline_secs);
    info!(
        "  task_reminders: every {} min, dedup policy {}",
        jobs_config.task_reminders.interval_minutes,
        jobs_config.task_reminders.dedup_policy.as_str()
    );
    info!(
        "  event_reminders: every {} min",
        jobs_config.event_reminders.interval_minutes
    );
    info!(
        "  goal_deadlines: cron '{}', policy {}",
        jobs_config.goal_deadlines.cron,
        jobs_config.goal_deadlines.policy.as_str()
    );

    if !app_config.tracker_db_path().exists() {
        info!(
            "Creating new tracker database at {:?}",
            app_config.tracker_db_path()
        );
    }
    let tracker_store = Arc::new(SqliteTrackerStore::new(app_config.tracker_db_path())?);

    info!("Initializing run history at {:?}", app_config.run_db_path());
    let run_store = Arc::new(SqliteRunStore::new(app_config.run_db_path())?);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let emitter = Arc::new(NotificationEmitter::new(tracker_store.clone()));

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        tracker_store,
        emitter,
        run_store.clone(),
        Arc::new(SystemClock),
    );

    let (mut scheduler, scheduler_handle) =
        create_scheduler(run_store, shutdown_token.clone(), job_context);
    scheduler.set_job_deadline(app_config.job_deadline());

    scheduler.register_job(Arc::new(TaskReminderJob::from_settings(
        &jobs_config.task_reminders,
    )));
    scheduler.register_job(Arc::new(EventReminderJob::from_settings(
        &jobs_config.event_reminders,
    )));
    scheduler.register_job(Arc::new(GoalDeadlineJob::from_settings(
        &jobs_config.goal_deadlines,
    )));

    if let Some(ref cleanup_settings) = jobs_config.run_history_cleanup {
        scheduler.register_job(Arc::new(RunHistoryCleanupJob::from_settings(
            cleanup_settings,
        )));
        info!(
            "Registered run history cleanup job (retention {} days)",
            cleanup_settings.retention_days
        );
    }

    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count()
    );

    // Answered once the scheduler loop below is running
    for job_id in cli_args.run_now.clone() {
        let handle = scheduler_handle.clone();
        tokio::spawn(async move {
            match handle.trigger_job(&job_id).await {
                Ok(()) => info!("Triggered {} at startup", job_id),
                Err(e) => warn!("Could not trigger {} at startup: {}", job_id, e),
            }
        });
    }
    info!("Metrics available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = metrics::run_metrics_server(app_config.metrics_port) => {
            info!("Metrics server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = scheduler.run() => {
            info!("Scheduler stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the scheduler a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
