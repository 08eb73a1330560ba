//! Job settings and per-job backoff state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::SchedulerError;

/// Callback invoked on every job tick. Returning `false` signals failure and
/// lengthens the effective period through backoff.
pub type JobCallback = Arc<dyn Fn() -> bool + Send + Sync>;

/// Configuration of a named periodic job.
#[derive(Clone)]
pub struct JobSetting {
    pub name: String,
    /// Period between ticks while the job is healthy.
    pub default_interval: Duration,
    /// Backoff ceiling: `backoff_count * default_interval` stays below this.
    pub max_interval: Duration,
    /// Fixed delay before the first tick.
    pub delay_start: Duration,
    /// Upper bound of the random jitter added to `delay_start`.
    pub random_delay: Duration,
    pub callback: JobCallback,
}

impl JobSetting {
    pub fn new<F>(name: impl Into<String>, default_interval: Duration, callback: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            default_interval,
            max_interval: default_interval,
            delay_start: Duration::ZERO,
            random_delay: Duration::ZERO,
            callback: Arc::new(callback),
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_delay_start(mut self, delay_start: Duration) -> Self {
        self.delay_start = delay_start;
        self
    }

    pub fn with_random_delay(mut self, random_delay: Duration) -> Self {
        self.random_delay = random_delay;
        self
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.name.is_empty() {
            return Err(SchedulerError::InvalidSetting("job name is empty".into()));
        }
        if self.default_interval.is_zero() {
            return Err(SchedulerError::InvalidSetting(format!(
                "{}: default interval is zero",
                self.name
            )));
        }
        if self.max_interval.is_zero() {
            return Err(SchedulerError::InvalidSetting(format!(
                "{}: max interval is zero",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for JobSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSetting")
            .field("name", &self.name)
            .field("default_interval", &self.default_interval)
            .field("max_interval", &self.max_interval)
            .field("delay_start", &self.delay_start)
            .field("random_delay", &self.random_delay)
            .finish()
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous invocation still running.
    Busy,
    /// Tick consumed by backoff; callback not invoked.
    Skipped,
    Succeeded,
    Failed,
}

/// Runtime state of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobState {
    pub skip_count: u32,
    pub backoff_count: u32,
    pub running: bool,
}

impl JobState {
    /// Decide whether this tick invokes the callback. Marks the job running
    /// when it does.
    pub fn begin_tick(&mut self) -> Option<TickOutcome> {
        if self.running {
            return Some(TickOutcome::Busy);
        }
        if self.skip_count > 0 {
            self.skip_count -= 1;
            return Some(TickOutcome::Skipped);
        }
        self.running = true;
        None
    }

    /// Record the callback result and recompute backoff.
    pub fn finish_tick(
        &mut self,
        success: bool,
        default_interval: Duration,
        max_interval: Duration,
    ) -> TickOutcome {
        self.running = false;
        if success {
            self.backoff_count = 0;
            return TickOutcome::Succeeded;
        }

        let candidate = self.backoff_count.saturating_mul(2).max(1);
        let stretched = default_interval.saturating_mul(candidate);
        if stretched < max_interval {
            self.backoff_count = candidate;
        }
        self.skip_count = self.backoff_count;
        TickOutcome::Failed
    }

    /// Run one full tick against `callback`.
    pub fn tick(
        &mut self,
        default_interval: Duration,
        max_interval: Duration,
        callback: impl FnOnce() -> bool,
    ) -> TickOutcome {
        if let Some(outcome) = self.begin_tick() {
            return outcome;
        }
        let success = callback();
        self.finish_tick(success, default_interval, max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn failure_doubles_backoff_until_ceiling() {
        let mut state = JobState::default();
        let max = Duration::from_secs(10);

        assert_eq!(state.tick(SEC, max, || false), TickOutcome::Failed);
        assert_eq!((state.backoff_count, state.skip_count), (1, 1));

        assert_eq!(state.tick(SEC, max, || true), TickOutcome::Skipped);
        assert_eq!(state.tick(SEC, max, || false), TickOutcome::Failed);
        assert_eq!(state.backoff_count, 2);

        for _ in 0..2 {
            assert_eq!(state.tick(SEC, max, || true), TickOutcome::Skipped);
        }
        state.tick(SEC, max, || false);
        assert_eq!(state.backoff_count, 4);

        for _ in 0..4 {
            state.tick(SEC, max, || true);
        }
        state.tick(SEC, max, || false);
        assert_eq!(state.backoff_count, 8);

        for _ in 0..8 {
            state.tick(SEC, max, || true);
        }
        // 16 * 1s >= 10s, so the multiplier stays at 8.
        state.tick(SEC, max, || false);
        assert_eq!(state.backoff_count, 8);
        assert_eq!(state.skip_count, 8);
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = JobState {
            skip_count: 0,
            backoff_count: 4,
            running: false,
        };
        assert_eq!(state.tick(SEC, SEC * 100, || true), TickOutcome::Succeeded);
        assert_eq!(state.backoff_count, 0);
        assert_eq!(state.skip_count, 0);
    }

    #[test]
    fn running_job_is_not_reentered() {
        let mut state = JobState::default();
        assert_eq!(state.begin_tick(), None);
        assert_eq!(state.begin_tick(), Some(TickOutcome::Busy));
        state.finish_tick(true, SEC, SEC);
        assert!(!state.running);
    }

    #[test]
    fn ceiling_equal_to_interval_never_backs_off() {
        let mut state = JobState::default();
        state.tick(SEC, SEC, || false);
        assert_eq!(state.backoff_count, 0);
        assert_eq!(state.skip_count, 0);
    }

    #[test]
    fn validate_rejects_bad_name_and_intervals() {
        let ok = JobSetting::new("job", SEC, || true);
        assert!(ok.validate().is_ok());
        assert!(JobSetting::new("", SEC, || true).validate().is_err());
        assert!(JobSetting::new("job", Duration::ZERO, || true).validate().is_err());
        let zero_max = JobSetting::new("job", SEC, || true).with_max_interval(Duration::ZERO);
        assert!(zero_max.validate().is_err());
    }

    #[test]
    fn ceiling_below_interval_is_valid_and_never_backs_off() {
        let setting = JobSetting::new("job", SEC * 10, || true).with_max_interval(SEC * 5);
        assert!(setting.validate().is_ok());

        let mut state = JobState::default();
        state.tick(setting.default_interval, setting.max_interval, || false);
        assert_eq!((state.backoff_count, state.skip_count), (0, 0));
    }
}
