//! Periodic `Cleanup` delivery, throttled by system load.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::CpuLoad;
use crate::scheduler::JobSetting;
use crate::session::{Command, CommandType, Input, SessionHandler};

pub const WATCHDOG_JOB: &str = "session-watchdog";

/// Cleanup is skipped while normalized load is at or above this.
pub const DEFAULT_CPU_LOAD_THRESHOLD: f32 = 0.33;

/// Longest the watchdog backs off, as a multiple of its interval.
const MAX_BACKOFF_FACTOR: u32 = 8;

pub struct Watchdog {
    handler: Arc<Mutex<SessionHandler>>,
    load: Arc<dyn CpuLoad>,
    threshold: f32,
    stopped: CancellationToken,
}

impl Watchdog {
    pub fn new(handler: Arc<Mutex<SessionHandler>>, load: Arc<dyn CpuLoad>, threshold: f32) -> Self {
        Self {
            handler,
            load,
            threshold: threshold.clamp(0.0, 1.0),
            stopped: CancellationToken::new(),
        }
    }

    /// Cancel `stopped` when a cleanup leaves the handler shut down.
    pub fn with_stop_signal(mut self, stopped: CancellationToken) -> Self {
        self.stopped = stopped;
        self
    }

    /// One watchdog tick. Returns `false` when cleanup was deferred or
    /// failed, which makes the scheduler back off.
    pub fn tick(&self) -> bool {
        if let Some(load) = self.load.system_load() {
            if load >= self.threshold {
                debug!(load, threshold = self.threshold, "system busy, deferring cleanup");
                return false;
            }
        }

        let mut handler = self.handler.lock();
        if !handler.is_available() {
            self.stopped.cancel();
            return true;
        }
        let mut command = Command::new(Input::new(CommandType::Cleanup));
        let result = handler.eval_command(&mut command);
        if !handler.is_available() {
            info!("session handler shut down by cleanup");
            self.stopped.cancel();
        }
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "watchdog cleanup failed");
                false
            }
        }
    }

    /// Scheduler job ticking every `interval`, first tick after one
    /// interval plus up to 10% jitter.
    pub fn into_job(self, interval: Duration) -> JobSetting {
        let watchdog = Arc::new(self);
        JobSetting::new(WATCHDOG_JOB, interval, move || watchdog.tick())
            .with_max_interval(interval.saturating_mul(MAX_BACKOFF_FACTOR))
            .with_delay_start(interval)
            .with_random_delay(interval / 10)
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("threshold", &self.threshold)
            .finish()
    }
}
