//! Metric recording through the `metrics` facade.
//!
//! Nothing is exported unless the embedding binary installs a recorder;
//! without one every call here is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const COMMAND_LATENCY: &str = "kana_command_latency_seconds";
pub const SESSIONS_ACTIVE: &str = "kana_sessions_active";
pub const SESSIONS_EVICTED: &str = "kana_sessions_evicted_total";
pub const ENGINE_RELOADS: &str = "kana_engine_reloads_total";

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_histogram!(COMMAND_LATENCY, "Time spent evaluating one command");
    describe_gauge!(SESSIONS_ACTIVE, "Sessions currently registered");
    describe_counter!(SESSIONS_EVICTED, "Sessions removed by capacity or cleanup");
    describe_counter!(ENGINE_RELOADS, "Engine builds consumed by the handler");
}

pub fn record_command(command: &'static str, latency: Duration, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    histogram!(COMMAND_LATENCY, "command" => command, "outcome" => outcome)
        .record(latency.as_secs_f64());
}

pub fn record_active_sessions(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

/// `reason` is `capacity` for LRU eviction, `cleanup` for stale sessions.
pub fn record_session_evicted(reason: &'static str) {
    counter!(SESSIONS_EVICTED, "reason" => reason).increment(1);
}

pub fn record_engine_reload(status: &'static str) {
    counter!(ENGINE_RELOADS, "status" => status).increment(1);
}
