//! Time source for session timeouts and rate limiting.
//!
//! All time-based policy in the session handler reads from a [`Clock`] so
//! tests can fast-forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    pub fn new(start_secs: u64) -> Self {
        Self { now: AtomicU64::new(start_secs) }
    }

    pub fn set(&self, secs: u64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        // Handler timestamps use 0 for "never", so tests start well past it.
        Self::new(1_000_000)
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
