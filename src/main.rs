//! kana-core-cli entry point.
//!
//! - `kana-core-cli` or `kana-core-cli serve` - run the session server (default)
//! - `kana-core-cli ping` - round-trip a no-op command
//! - `kana-core-cli shutdown` - stop a running server
//! - `kana-core-cli reload-engine FILE` - queue an engine reload
//! - `kana-core-cli config show|defaults` - print configuration

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kana_core::cli::{config_cmd, get_socket_path, run_ping, run_reload_engine, run_shutdown};
use kana_core::config::{self as kana_config, EnvConfig};
use kana_core::engine::{DictionaryBuilder, Engine, EngineBuilder};
use kana_core::ipc;
use kana_core::loader::DataLoader;
use kana_core::platform::LoadAverage;
use kana_core::scheduler::{JobScheduler, Scheduler};
use kana_core::session::{Command, CommandType, Input, SessionHandler};
use kana_core::telemetry::{init_logging, init_metrics, LogConfig};
use kana_core::SessionServer;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => match run_serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Server error: {}", e);
                ExitCode::FAILURE
            }
        },
        "ping" => ExitCode::from(run_ping(&get_socket_path()).await as u8),
        "shutdown" => ExitCode::from(run_shutdown(&get_socket_path()).await as u8),
        "reload-engine" => {
            ExitCode::from(run_reload_engine(&get_socket_path(), &args[2..]).await as u8)
        }
        "config" => match args.get(2).map(|s| s.as_str()).unwrap_or("show") {
            "show" => {
                config_cmd::run_show();
                ExitCode::SUCCESS
            }
            "defaults" => {
                config_cmd::run_defaults();
                ExitCode::SUCCESS
            }
            other => {
                eprintln!("Unknown config subcommand: {}", other);
                ExitCode::FAILURE
            }
        },
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("kana-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        "kana-core {} - Japanese input method session server

USAGE:
    kana-core-cli [COMMAND]

COMMANDS:
    serve                Run the session server (default)
    ping                 Check that a server is answering
    shutdown             Ask a running server to shut down
    reload-engine FILE   Queue an engine reload [--priority N] [--install PATH]
    config show          Print effective configuration
    config defaults      Print default configuration
    version              Show version information
    help                 Show this help message

ENVIRONMENT:
    KANA_CORE_SOCKET_PATH   IPC socket path
    KANA_CORE_DATA_FILE     Dictionary data file loaded at startup
    KANA_CORE_RESTRICTED    Tight limits for sandboxed launches
    KANA_CORE_LOG_FORMAT    json (default) or pretty
    RUST_LOG                Log filter (default: info)

EXIT CODES:
    0  Success
    1  Failure
    3  Connection error
",
        env!("CARGO_PKG_VERSION")
    );
}

/// Engine from the configured data file, or the empty default engine when
/// none is configured or it cannot be loaded.
fn initial_engine(env: &EnvConfig, builder: &dyn EngineBuilder) -> Result<Engine, Box<dyn std::error::Error>> {
    if let Some(path) = &env.data_file {
        match builder.build(path, None).and_then(Engine::new) {
            Ok(engine) => {
                info!(path = %path.display(), entries = engine.entry_count(), "engine loaded");
                return Ok(engine);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "falling back to default engine"),
        }
    }
    Ok(Engine::from_default(builder)?)
}

async fn run_serve() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LogConfig::from_env())?;
    init_metrics();

    let env = kana_config::load();
    let builder: Arc<dyn EngineBuilder> = Arc::new(DictionaryBuilder);
    let engine = initial_engine(&env, builder.as_ref())?;

    let handler = SessionHandler::new(Arc::new(engine), env.handler.clone())
        .with_data_loader(DataLoader::new(builder));
    let scheduler: Arc<dyn JobScheduler> = Arc::new(Scheduler::new());
    let server = Arc::new(
        SessionServer::new(handler, scheduler.clone())
            .with_max_frame_size(env.ipc_server.max_frame_size),
    );
    server.start_watchdog(Arc::new(LoadAverage::new()), env.cpu_load_threshold)?;
    info!(restricted = env.restricted, sessions = env.handler.max_sessions, "session server starting");

    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(ipc::run_server(
        env.ipc_server.clone(),
        server.clone(),
        shutdown.clone(),
    ));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
            let mut command = Command::new(Input::new(CommandType::Shutdown));
            let _ = server.eval(&mut command);
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    server_task.await??;
    server.stop_watchdog();
    scheduler.remove_all_jobs();
    Ok(())
}
