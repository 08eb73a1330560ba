//! Integration tests for the cleanup watchdog and its scheduler wiring.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use kana_core::clock::MockClock;
use kana_core::engine::{DictionaryBuilder, Engine};
use kana_core::platform::{AlwaysAlive, CpuLoad};
use kana_core::scheduler::{JobScheduler, Scheduler, SchedulerError};
use kana_core::session::{Command, CommandType, Input, SessionHandler, SessionHandlerConfig};
use kana_core::watchdog::{Watchdog, DEFAULT_CPU_LOAD_THRESHOLD, WATCHDOG_JOB};
use kana_core::SessionServer;

struct FixedLoad(Option<f32>);

impl CpuLoad for FixedLoad {
    fn system_load(&self) -> Option<f32> {
        self.0
    }
}

/// Handler holding one session that the next cleanup will evict.
fn handler_with_stale_session() -> (Arc<Mutex<SessionHandler>>, u64) {
    let clock = Arc::new(MockClock::default());
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let mut handler = SessionHandler::new(
        engine,
        SessionHandlerConfig {
            create_session_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    )
    .with_clock(clock.clone())
    .with_liveness(Arc::new(AlwaysAlive));

    let mut command = Command::new(Input::new(CommandType::CreateSession));
    handler.eval_command(&mut command).unwrap();
    clock.advance(60);
    (Arc::new(Mutex::new(handler)), command.output.id)
}

// === Ticks ===

#[test]
fn tick_runs_cleanup_when_idle() {
    let (handler, id) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler.clone(), Arc::new(FixedLoad(Some(0.05))), 0.33);

    assert!(watchdog.tick());
    assert!(!handler.lock().registry().contains(id));
}

#[test]
fn tick_defers_cleanup_under_load() {
    let (handler, id) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler.clone(), Arc::new(FixedLoad(Some(0.9))), 0.33);

    assert!(!watchdog.tick());
    assert!(handler.lock().registry().contains(id));
}

#[test]
fn load_at_threshold_counts_as_busy() {
    let (handler, _) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler, Arc::new(FixedLoad(Some(0.5))), 0.5);
    assert!(!watchdog.tick());
}

#[test]
fn unknown_load_does_not_block_cleanup() {
    let (handler, id) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler.clone(), Arc::new(FixedLoad(None)), DEFAULT_CPU_LOAD_THRESHOLD);

    assert!(watchdog.tick());
    assert!(!handler.lock().registry().contains(id));
}

#[test]
fn tick_after_shutdown_is_a_success() {
    let (handler, _) = handler_with_stale_session();
    let mut command = Command::new(Input::new(CommandType::Shutdown));
    handler.lock().eval_command(&mut command).unwrap();

    let watchdog = Watchdog::new(handler, Arc::new(FixedLoad(Some(0.0))), 0.33);
    assert!(watchdog.tick());
}

#[test]
fn idle_shutdown_fires_stop_signal() {
    let clock = Arc::new(MockClock::default());
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let handler = SessionHandler::new(
        engine,
        SessionHandlerConfig {
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        },
    )
    .with_clock(clock.clone())
    .with_liveness(Arc::new(AlwaysAlive));
    let handler = Arc::new(Mutex::new(handler));

    let stopped = CancellationToken::new();
    let watchdog = Watchdog::new(handler.clone(), Arc::new(FixedLoad(None)), 0.33)
        .with_stop_signal(stopped.clone());

    clock.advance(30);
    assert!(watchdog.tick());
    assert!(!stopped.is_cancelled());

    clock.advance(30);
    assert!(watchdog.tick());
    assert!(!handler.lock().is_available());
    assert!(stopped.is_cancelled());
}

#[test]
fn stale_session_cleanup_leaves_stop_signal_alone() {
    let (handler, _) = handler_with_stale_session();
    let stopped = CancellationToken::new();
    let watchdog = Watchdog::new(handler, Arc::new(FixedLoad(None)), 0.33)
        .with_stop_signal(stopped.clone());

    assert!(watchdog.tick());
    assert!(!stopped.is_cancelled());
}

// === Job wiring ===

#[test]
fn job_setting_backs_off_to_eight_intervals() {
    let (handler, _) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler, Arc::new(FixedLoad(None)), 0.33);
    let interval = Duration::from_secs(180);

    let setting = watchdog.into_job(interval);
    assert_eq!(setting.name, WATCHDOG_JOB);
    assert_eq!(setting.default_interval, interval);
    assert_eq!(setting.max_interval, interval * 8);
    assert_eq!(setting.delay_start, interval);
    assert_eq!(setting.random_delay, Duration::from_secs(18));
    assert!(setting.validate().is_ok());
}

#[test]
fn job_callback_delivers_cleanup() {
    let (handler, id) = handler_with_stale_session();
    let watchdog = Watchdog::new(handler.clone(), Arc::new(FixedLoad(None)), 0.33);
    let setting = watchdog.into_job(Duration::from_secs(180));

    assert!((setting.callback)());
    assert!(!handler.lock().registry().contains(id));
}

#[test]
fn session_server_registers_watchdog_once() {
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let handler = SessionHandler::new(engine, SessionHandlerConfig::default());
    let scheduler: Arc<dyn JobScheduler> = Arc::new(Scheduler::new());
    let server = SessionServer::new(handler, scheduler.clone());

    server.start_watchdog(Arc::new(FixedLoad(None)), 0.33).unwrap();
    assert!(scheduler.has_job(WATCHDOG_JOB));

    let err = server.start_watchdog(Arc::new(FixedLoad(None)), 0.33).unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateJob(_)));

    assert!(server.stop_watchdog());
    assert!(!scheduler.has_job(WATCHDOG_JOB));
}

#[test]
fn dropping_server_removes_watchdog() {
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let handler = SessionHandler::new(engine, SessionHandlerConfig::default());
    let scheduler: Arc<dyn JobScheduler> = Arc::new(Scheduler::new());

    let server = SessionServer::new(handler, scheduler.clone());
    server.start_watchdog(Arc::new(FixedLoad(None)), 0.33).unwrap();
    drop(server);
    assert!(!scheduler.has_job(WATCHDOG_JOB));
}

#[test]
fn shutdown_command_fires_server_stop_signal() {
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let handler = SessionHandler::new(engine, SessionHandlerConfig::default());
    let server = SessionServer::new(handler, Arc::new(Scheduler::new()));
    assert!(!server.stopped().is_cancelled());

    let mut command = Command::new(Input::new(CommandType::NoOperation));
    server.eval(&mut command).unwrap();
    assert!(!server.stopped().is_cancelled());

    let mut command = Command::new(Input::new(CommandType::Shutdown));
    server.eval(&mut command).unwrap();
    assert!(server.stopped().is_cancelled());
}

#[cfg(unix)]
#[tokio::test]
async fn watchdog_idle_shutdown_stops_ipc_server() {
    use kana_core::ipc::{run_server, IpcServerConfig};

    let clock = Arc::new(MockClock::default());
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    let handler = SessionHandler::new(
        engine,
        SessionHandlerConfig {
            watchdog_interval: Duration::from_secs(1),
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        },
    )
    .with_clock(clock.clone())
    .with_liveness(Arc::new(AlwaysAlive));
    let server = Arc::new(SessionServer::new(handler, Arc::new(Scheduler::new())));

    // Already idle for the whole timeout; the first watchdog tick shuts down.
    clock.advance(60);
    server.start_watchdog(Arc::new(FixedLoad(None)), 0.33).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = IpcServerConfig {
        socket_path: dir.path().join("kana.sock").to_string_lossy().into_owned(),
        ..Default::default()
    };
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(run_server(config, server.clone(), shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(10), server_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(shutdown.is_cancelled());
    assert!(!server.is_available());
}
