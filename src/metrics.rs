use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all reminder engine metrics
const PREFIX: &str = "stutrack";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job runs by outcome"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is currently running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Reminder Metrics
    pub static ref NOTIFICATIONS_EMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_emitted_total"), "Notifications written, by type"),
        &["type"]
    ).expect("Failed to create notifications_emitted_total metric");

    pub static ref REMINDER_CLAIMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_reminder_claims_total"), "Reminder claim attempts by outcome"),
        &["condition", "outcome"]
    ).expect("Failed to create reminder_claims_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_EMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REMINDER_CLAIMS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a finished background job run.
///
/// `status` is one of "success", "failed", "cancelled", "timeout" or "panic".
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_notification_emitted(notification_type: &str) {
    NOTIFICATIONS_EMITTED_TOTAL
        .with_label_values(&[notification_type])
        .inc();
}

/// `outcome` is "won", "already_claimed" or "error".
pub fn record_reminder_claim(condition: &str, outcome: &str) {
    REMINDER_CLAIMS_TOTAL
        .with_label_values(&[condition, outcome])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve `/metrics` for Prometheus scraping until the listener fails.
pub async fn run_metrics_server(port: u16) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    Ok(axum::serve(listener, app).await?)
}
