//! Timer-thread-per-job scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::{debug, trace};

use super::job::{JobSetting, JobState, TickOutcome};
use super::{JobScheduler, SchedulerError};

/// State shared between the scheduler and one timer thread.
struct JobShared {
    setting: JobSetting,
    state: Mutex<JobState>,
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl JobShared {
    /// Sleep up to `timeout`. Returns `true` once the job has been stopped.
    fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wakeup.wait_until(&mut stopped, deadline).timed_out() {
                return *stopped;
            }
        }
        true
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wakeup.notify_all();
    }

    fn tick(&self) -> TickOutcome {
        // The state lock is released while the callback runs.
        if let Some(outcome) = self.state.lock().begin_tick() {
            trace!(job = %self.setting.name, ?outcome, "tick not run");
            return outcome;
        }

        let success = (self.setting.callback)();

        let mut state = self.state.lock();
        let previous = state.backoff_count;
        let outcome = state.finish_tick(
            success,
            self.setting.default_interval,
            self.setting.max_interval,
        );
        if state.backoff_count != previous {
            debug!(
                job = %self.setting.name,
                backoff_count = state.backoff_count,
                skip_count = state.skip_count,
                "job backoff changed"
            );
        }
        outcome
    }
}

struct JobEntry {
    shared: Arc<JobShared>,
    handle: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn stop_and_join(mut self) {
        self.shared.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(job = %self.shared.setting.name, "job thread panicked");
            }
        }
    }
}

/// Runs each registered job on its own named timer thread.
///
/// Removing a job joins its thread, so a job must never be removed from
/// inside its own callback, nor while holding a lock that callback takes.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of a job's backoff state.
    pub fn job_state(&self, name: &str) -> Option<JobState> {
        let jobs = self.jobs.lock();
        jobs.get(name).map(|entry| entry.shared.state.lock().clone())
    }

    fn first_delay(setting: &JobSetting) -> Duration {
        let jitter_ms = setting.random_delay.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        setting.delay_start + jitter
    }

    fn run_timer(shared: Arc<JobShared>, first_delay: Duration) {
        let mut delay = first_delay;
        while !shared.wait_stopped(delay) {
            shared.tick();
            delay = shared.setting.default_interval;
        }
        trace!(job = %shared.setting.name, "job thread exiting");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler for Scheduler {
    fn add_job(&self, setting: JobSetting) -> Result<(), SchedulerError> {
        setting.validate()?;

        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&setting.name) {
            return Err(SchedulerError::DuplicateJob(setting.name));
        }

        let first_delay = Self::first_delay(&setting);
        let name = setting.name.clone();
        let shared = Arc::new(JobShared {
            setting,
            state: Mutex::new(JobState::default()),
            stopped: Mutex::new(false),
            wakeup: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("job-{}", name))
            .spawn(move || Self::run_timer(thread_shared, first_delay))
            .map_err(SchedulerError::Spawn)?;

        debug!(job = %name, ?first_delay, "job added");
        jobs.insert(
            name,
            JobEntry {
                shared,
                handle: Some(handle),
            },
        );
        Ok(())
    }

    fn remove_job(&self, name: &str) -> bool {
        // Join outside the map lock so other jobs stay manageable meanwhile.
        let entry = self.jobs.lock().remove(name);
        match entry {
            Some(entry) => {
                entry.stop_and_join();
                debug!(job = %name, "job removed");
                true
            }
            None => false,
        }
    }

    fn remove_all_jobs(&self) {
        let entries: Vec<JobEntry> = self.jobs.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.stop_and_join();
        }
    }

    fn has_job(&self, name: &str) -> bool {
        self.jobs.lock().contains_key(name)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.remove_all_jobs();
    }
}
