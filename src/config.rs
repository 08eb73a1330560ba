//! Runtime configuration loading from environment variables.
//!
//! All values come from `KANA_CORE_*` environment variables with documented
//! defaults. Invalid values fall back to defaults without crashing; valid
//! ones are clamped into range.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `KANA_CORE_IDLE_TIMEOUT` | 0 | Shut down after this long with no sessions (secs, 0 = never) |
//! | `KANA_CORE_MAX_SESSIONS` | 64 | Session registry capacity, 2..=128 |
//! | `KANA_CORE_CREATE_SESSION_MIN_INTERVAL` | 0 | Min secs between session creations, 0..=10 |
//! | `KANA_CORE_WATCHDOG_INTERVAL` | 180 | Secs between cleanup ticks |
//! | `KANA_CORE_LAST_COMMAND_TIMEOUT` | 3600 | Idle session timeout (secs), 10..=7200 |
//! | `KANA_CORE_LAST_CREATE_SESSION_TIMEOUT` | 300 | Unused session timeout (secs), 1..=600 |
//! | `KANA_CORE_RESTRICTED` | false | Sandboxed launch: tight limits above |
//! | `KANA_CORE_DATA_FILE` | unset | Dictionary data file |
//! | `KANA_CORE_SOCKET_PATH` | platform default | IPC socket path |
//! | `KANA_CORE_IPC_FRAME_LIMIT` | 1048576 | Max IPC frame size (bytes) |
//! | `KANA_CORE_MAX_CONNECTIONS` | 64 | Max concurrent IPC clients |
//! | `KANA_CORE_CPU_LOAD_THRESHOLD` | 0.33 | Watchdog skips cleanup above this load |

use std::path::PathBuf;
use std::time::Duration;

use crate::ipc::{
    default_socket_path, IpcServerConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_FRAME_SIZE,
    MIN_FRAME_SIZE,
};
use crate::session::SessionHandlerConfig;
use crate::watchdog::DEFAULT_CPU_LOAD_THRESHOLD;

/// Effective configuration summary, one `KEY=value` pair per field.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub restricted: bool,
    pub idle_timeout_secs: u64,
    pub max_sessions: usize,
    pub create_session_min_interval_secs: u64,
    pub watchdog_interval_secs: u64,
    pub last_command_timeout_secs: u64,
    pub create_session_timeout_secs: u64,
    pub data_file: Option<PathBuf>,
    pub socket_path: String,
    pub ipc_frame_limit: usize,
    pub max_connections: usize,
    pub cpu_load_threshold: f32,
}

impl EffectiveConfig {
    pub fn to_env_lines(&self) -> Vec<String> {
        let data_file = self
            .data_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        vec![
            format!("KANA_CORE_RESTRICTED={}", self.restricted),
            format!("KANA_CORE_IDLE_TIMEOUT={}", self.idle_timeout_secs),
            format!("KANA_CORE_MAX_SESSIONS={}", self.max_sessions),
            format!(
                "KANA_CORE_CREATE_SESSION_MIN_INTERVAL={}",
                self.create_session_min_interval_secs
            ),
            format!("KANA_CORE_WATCHDOG_INTERVAL={}", self.watchdog_interval_secs),
            format!("KANA_CORE_LAST_COMMAND_TIMEOUT={}", self.last_command_timeout_secs),
            format!(
                "KANA_CORE_LAST_CREATE_SESSION_TIMEOUT={}",
                self.create_session_timeout_secs
            ),
            format!("KANA_CORE_DATA_FILE={}", data_file),
            format!("KANA_CORE_SOCKET_PATH={}", self.socket_path),
            format!("KANA_CORE_IPC_FRAME_LIMIT={}", self.ipc_frame_limit),
            format!("KANA_CORE_MAX_CONNECTIONS={}", self.max_connections),
            format!("KANA_CORE_CPU_LOAD_THRESHOLD={}", self.cpu_load_threshold),
        ]
    }
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub restricted: bool,
    pub handler: SessionHandlerConfig,
    pub data_file: Option<PathBuf>,
    pub ipc_server: IpcServerConfig,
    pub cpu_load_threshold: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            restricted: false,
            handler: SessionHandlerConfig::default(),
            data_file: None,
            ipc_server: IpcServerConfig::default(),
            cpu_load_threshold: DEFAULT_CPU_LOAD_THRESHOLD,
        }
    }
}

fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_f32(key: &str, default: f32) -> f32 {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Accepts `1/true/yes/on`, case-insensitive.
fn parse_bool(key: &str) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn parse_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load session limits from environment. Restricted mode ignores the
/// individual overrides.
fn load_handler_config(restricted: bool) -> SessionHandlerConfig {
    if restricted {
        return SessionHandlerConfig::restricted();
    }
    let defaults = SessionHandlerConfig::default();
    let idle = parse_u64("KANA_CORE_IDLE_TIMEOUT", 0);
    let secs = |key: &str, default: Duration| {
        Duration::from_secs(parse_u64(key, default.as_secs()))
    };

    SessionHandlerConfig {
        max_sessions: parse_usize("KANA_CORE_MAX_SESSIONS", defaults.max_sessions),
        create_session_min_interval: secs(
            "KANA_CORE_CREATE_SESSION_MIN_INTERVAL",
            defaults.create_session_min_interval,
        ),
        watchdog_interval: secs("KANA_CORE_WATCHDOG_INTERVAL", defaults.watchdog_interval),
        last_command_timeout: secs(
            "KANA_CORE_LAST_COMMAND_TIMEOUT",
            defaults.last_command_timeout,
        ),
        create_session_timeout: secs(
            "KANA_CORE_LAST_CREATE_SESSION_TIMEOUT",
            defaults.create_session_timeout,
        ),
        idle_shutdown_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
    }
    .clamped()
}

fn load_ipc_server_config() -> IpcServerConfig {
    let max_frame_size = parse_usize("KANA_CORE_IPC_FRAME_LIMIT", DEFAULT_MAX_FRAME_SIZE);
    let max_connections = parse_usize("KANA_CORE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
    IpcServerConfig {
        socket_path: std::env::var("KANA_CORE_SOCKET_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(default_socket_path),
        max_frame_size: max_frame_size.max(MIN_FRAME_SIZE),
        max_connections: max_connections.max(1),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let restricted = parse_bool("KANA_CORE_RESTRICTED");
    let threshold = parse_f32("KANA_CORE_CPU_LOAD_THRESHOLD", DEFAULT_CPU_LOAD_THRESHOLD);

    EnvConfig {
        restricted,
        handler: load_handler_config(restricted),
        data_file: parse_path("KANA_CORE_DATA_FILE"),
        ipc_server: load_ipc_server_config(),
        cpu_load_threshold: threshold.clamp(0.0, 1.0),
    }
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            restricted: self.restricted,
            idle_timeout_secs: self
                .handler
                .idle_shutdown_timeout
                .map(|t| t.as_secs())
                .unwrap_or(0),
            max_sessions: self.handler.max_sessions,
            create_session_min_interval_secs: self.handler.create_session_min_interval.as_secs(),
            watchdog_interval_secs: self.handler.watchdog_interval.as_secs(),
            last_command_timeout_secs: self.handler.last_command_timeout.as_secs(),
            create_session_timeout_secs: self.handler.create_session_timeout.as_secs(),
            data_file: self.data_file.clone(),
            socket_path: self.ipc_server.socket_path.clone(),
            ipc_frame_limit: self.ipc_server.max_frame_size,
            max_connections: self.ipc_server.max_connections,
            cpu_load_threshold: self.cpu_load_threshold,
        }
    }
}
