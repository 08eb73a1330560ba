//! Integration tests for `Cleanup`: stale-session eviction, suspend
//! detection, and idle shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kana_core::clock::MockClock;
use kana_core::engine::{DictionaryBuilder, Engine};
use kana_core::platform::ApplicationLiveness;
use kana_core::session::{
    ApplicationInfo, Command, CommandType, ErrorCode, Input, KeyEvent, SessionHandler,
    SessionHandlerConfig,
};
use kana_core::user_data::NullUserDataStore;

const T0: u64 = 1_000_000;

/// Liveness probe that reports a fixed set of process ids as gone.
struct DeadProcesses(HashSet<u32>);

impl ApplicationLiveness for DeadProcesses {
    fn is_alive(&self, info: &ApplicationInfo) -> bool {
        info.process_id.map_or(true, |pid| !self.0.contains(&pid))
    }
}

fn handler(settings: SessionHandlerConfig, clock: &Arc<MockClock>) -> SessionHandler {
    let engine = Arc::new(Engine::from_default(&DictionaryBuilder).unwrap());
    SessionHandler::new(engine, settings)
        .with_clock(clock.clone())
        .with_liveness(Arc::new(DeadProcesses(HashSet::from([4242]))))
}

fn eval(handler: &mut SessionHandler, input: Input) -> Command {
    let mut command = Command::new(input);
    handler.eval_command(&mut command).unwrap();
    command
}

fn create(handler: &mut SessionHandler) -> u64 {
    eval(handler, Input::new(CommandType::CreateSession)).output.id
}

fn touch(handler: &mut SessionHandler, id: u64) {
    eval(handler, Input::new(CommandType::SendKey).with_id(id).with_key(KeyEvent::char('a')));
}

fn cleanup(handler: &mut SessionHandler) -> Command {
    eval(handler, Input::new(CommandType::Cleanup))
}

// === Eviction ===

#[test]
fn capacity_then_command_timeout_scenario() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            max_sessions: 2,
            last_command_timeout: Duration::from_secs(10),
            ..Default::default()
        },
        &clock,
    );

    let a = create(&mut handler);
    let b = create(&mut handler);
    touch(&mut handler, b);
    clock.advance(11);
    let c = create(&mut handler);
    assert_eq!(handler.registry().ids(), vec![b, c]);
    assert!(!handler.registry().contains(a));

    cleanup(&mut handler);
    assert_eq!(handler.registry().ids(), vec![c]);
}

#[test]
fn cleanup_removes_dead_unused_and_stale_sessions() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            create_session_timeout: Duration::from_secs(60),
            last_command_timeout: Duration::from_secs(100),
            ..Default::default()
        },
        &clock,
    );

    let dead_app = ApplicationInfo { process_id: Some(4242), thread_id: None };
    let dead = eval(
        &mut handler,
        Input::new(CommandType::CreateSession).with_application_info(dead_app),
    )
    .output
    .id;
    let never_used = create(&mut handler);
    let stale = create(&mut handler);

    clock.advance(1);
    touch(&mut handler, dead);
    touch(&mut handler, stale);

    clock.set(T0 + 115);
    let fresh = create(&mut handler);
    clock.set(T0 + 119);
    touch(&mut handler, fresh);

    clock.set(T0 + 120);
    let command = cleanup(&mut handler);
    assert_eq!(command.output.error_code, ErrorCode::SessionSuccess);

    assert_eq!(handler.registry().ids(), vec![fresh]);
    for id in [dead, never_used, stale] {
        assert!(!handler.registry().contains(id));
    }
}

#[test]
fn sessions_within_timeouts_survive() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            create_session_timeout: Duration::from_secs(60),
            last_command_timeout: Duration::from_secs(100),
            ..Default::default()
        },
        &clock,
    );
    let unused = create(&mut handler);
    let active = create(&mut handler);
    touch(&mut handler, active);

    clock.advance(59);
    cleanup(&mut handler);
    assert_eq!(handler.registry().ids(), vec![unused, active]);

    // The create timeout applies only until the first command.
    clock.advance(1);
    cleanup(&mut handler);
    assert_eq!(handler.registry().ids(), vec![active]);
}

#[test]
fn cleanup_syncs_user_data() {
    let clock = Arc::new(MockClock::new(T0));
    let store = Arc::new(NullUserDataStore::new());
    let mut handler = handler(SessionHandlerConfig::default(), &clock).with_user_data(store.clone());

    cleanup(&mut handler);
    cleanup(&mut handler);
    assert_eq!(store.sync_count(), 2);
}

// === Suspend ===

#[test]
fn long_gap_between_cleanups_extends_timeouts() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            watchdog_interval: Duration::from_secs(10),
            create_session_timeout: Duration::from_secs(60),
            ..Default::default()
        },
        &clock,
    );
    cleanup(&mut handler);
    let id = create(&mut handler);

    // 500s since the last cleanup, 20s of which were expected.
    clock.advance(500);
    cleanup(&mut handler);
    assert!(handler.registry().contains(id));

    clock.advance(10);
    cleanup(&mut handler);
    assert!(!handler.registry().contains(id));
}

#[test]
fn first_cleanup_assumes_no_suspend() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            watchdog_interval: Duration::from_secs(10),
            create_session_timeout: Duration::from_secs(60),
            ..Default::default()
        },
        &clock,
    );
    let id = create(&mut handler);
    clock.advance(500);
    cleanup(&mut handler);
    assert!(!handler.registry().contains(id));
}

// === Idle shutdown ===

#[test]
fn idle_registry_shuts_down_after_timeout() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        &clock,
    );

    clock.advance(30);
    cleanup(&mut handler);
    assert!(handler.is_available());

    clock.advance(30);
    cleanup(&mut handler);
    assert!(!handler.is_available());
}

#[test]
fn idle_timer_restarts_once_registry_empties() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        &clock,
    );

    clock.set(T0 + 50);
    let id = create(&mut handler);
    clock.set(T0 + 70);
    cleanup(&mut handler);
    assert!(handler.is_available());

    clock.set(T0 + 80);
    eval(&mut handler, Input::new(CommandType::DeleteSession).with_id(id));
    clock.set(T0 + 90);
    cleanup(&mut handler);

    clock.set(T0 + 149);
    cleanup(&mut handler);
    assert!(handler.is_available());

    clock.set(T0 + 150);
    cleanup(&mut handler);
    assert!(!handler.is_available());
}

#[test]
fn session_between_cleanups_restarts_idle_timer() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(
        SessionHandlerConfig {
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        &clock,
    );

    clock.set(T0 + 10);
    let id = create(&mut handler);
    clock.set(T0 + 55);
    eval(&mut handler, Input::new(CommandType::DeleteSession).with_id(id));

    // Empty for only 6s: the empty-since time starts over here.
    clock.set(T0 + 61);
    cleanup(&mut handler);
    assert!(handler.is_available());

    clock.set(T0 + 120);
    cleanup(&mut handler);
    assert!(handler.is_available());

    clock.set(T0 + 121);
    cleanup(&mut handler);
    assert!(!handler.is_available());
}

#[test]
fn idle_shutdown_disabled_by_default() {
    let clock = Arc::new(MockClock::new(T0));
    let mut handler = handler(SessionHandlerConfig::default(), &clock);
    clock.advance(1_000_000);
    cleanup(&mut handler);
    assert!(handler.is_available());
}
