//! Host introspection used by session cleanup and the watchdog.
//!
//! Both probes answer conservatively: when the host cannot be queried the
//! application is reported alive and the load unknown.

use std::path::PathBuf;

use crate::session::ApplicationInfo;

/// Whether the client application owning a session still exists.
pub trait ApplicationLiveness: Send + Sync {
    fn is_alive(&self, info: &ApplicationInfo) -> bool;
}

/// Liveness from `/proc` on Linux; always alive elsewhere.
#[derive(Debug, Clone)]
pub struct ProcessLiveness {
    proc_root: PathBuf,
}

impl ProcessLiveness {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Probe a different procfs mount (used by tests).
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for ProcessLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationLiveness for ProcessLiveness {
    fn is_alive(&self, info: &ApplicationInfo) -> bool {
        if !cfg!(target_os = "linux") || !self.proc_root.is_dir() {
            return true;
        }
        let Some(pid) = info.process_id else {
            return true;
        };
        let process_dir = self.proc_root.join(pid.to_string());
        if !process_dir.exists() {
            return false;
        }
        match info.thread_id {
            Some(tid) => process_dir.join("task").join(tid.to_string()).exists(),
            None => true,
        }
    }
}

/// Treats every application as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl ApplicationLiveness for AlwaysAlive {
    fn is_alive(&self, _info: &ApplicationInfo) -> bool {
        true
    }
}

/// System-wide CPU load in `[0.0, 1.0]` per core, when measurable.
pub trait CpuLoad: Send + Sync {
    fn system_load(&self) -> Option<f32>;
}

/// One-minute load average from `/proc/loadavg`, normalized by core count.
#[derive(Debug, Clone)]
pub struct LoadAverage {
    path: PathBuf,
    cores: usize,
}

impl LoadAverage {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/loadavg"),
            cores: num_cpus::get().max(1),
        }
    }

    pub fn with_source(path: impl Into<PathBuf>, cores: usize) -> Self {
        Self {
            path: path.into(),
            cores: cores.max(1),
        }
    }
}

impl Default for LoadAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuLoad for LoadAverage {
    fn system_load(&self) -> Option<f32> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let one_minute: f32 = contents.split_whitespace().next()?.parse().ok()?;
        Some((one_minute / self.cores as f32).clamp(0.0, 1.0))
    }
}
