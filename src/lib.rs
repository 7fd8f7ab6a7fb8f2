pub mod background_jobs;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod notifications;
pub mod run_store;
pub mod sqlite_persistence;
pub mod tracker_store;
