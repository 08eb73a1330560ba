//! Background job scheduling for the session server.
//!
//! Each job runs on a dedicated timer thread with a jittered first tick and
//! exponential backoff while its callback keeps failing.

mod job;
mod runner;

use thiserror::Error;

pub use job::{JobCallback, JobSetting, JobState, TickOutcome};
pub use runner::Scheduler;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    #[error("Invalid job setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to spawn job thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Registry of named periodic jobs.
///
/// Owners hold an `Arc<dyn JobScheduler>` so tests can substitute a recorder.
pub trait JobScheduler: Send + Sync {
    fn add_job(&self, setting: JobSetting) -> Result<(), SchedulerError>;
    fn remove_job(&self, name: &str) -> bool;
    fn remove_all_jobs(&self);
    fn has_job(&self, name: &str) -> bool;
}
