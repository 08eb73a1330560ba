//! Telemetry for the session server.
//!
//! Structured logging via `tracing` and counters/histograms via the
//! `metrics` facade. Nothing here opens a network listener.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_active_sessions, record_command, record_engine_reload,
    record_session_evicted, COMMAND_LATENCY, ENGINE_RELOADS, SESSIONS_ACTIVE, SESSIONS_EVICTED,
};
