//! Subcommands of `kana-core-cli` other than `serve`.
//!
//! ```bash
//! kana-core-cli ping                  # NoOperation round trip, exit 0 if served
//! kana-core-cli shutdown              # ask the server to stop
//! kana-core-cli reload-engine FILE    # queue an engine reload
//! kana-core-cli config show           # effective KANA_CORE_* values
//! ```

mod client;
pub mod config_cmd;

use crate::loader::EngineReloadRequest;
use crate::session::{CommandType, ErrorCode, Input};

pub use client::{CliError, CliIpcClient};

/// Socket path from `KANA_CORE_SOCKET_PATH` or the platform default.
pub fn get_socket_path() -> String {
    crate::config::load().ipc_server.socket_path
}

async fn send_simple(socket_path: &str, input: Input) -> i32 {
    match CliIpcClient::new(socket_path).send(&input).await {
        Ok(output) if output.error_code == ErrorCode::SessionSuccess => 0,
        Ok(_) => {
            eprintln!("Server rejected {}", input.kind.as_str());
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}

pub async fn run_ping(socket_path: &str) -> i32 {
    let code = send_simple(socket_path, Input::new(CommandType::NoOperation)).await;
    if code == 0 {
        println!("ok");
    }
    code
}

pub async fn run_shutdown(socket_path: &str) -> i32 {
    send_simple(socket_path, Input::new(CommandType::Shutdown)).await
}

/// `args` are the words after `reload-engine`: `FILE [--priority N]
/// [--install PATH]`.
pub async fn run_reload_engine(socket_path: &str, args: &[String]) -> i32 {
    let Some(file) = args.first() else {
        eprintln!("Usage: kana-core-cli reload-engine FILE [--priority N] [--install PATH]");
        return 1;
    };
    let mut request = EngineReloadRequest::new(file);

    let mut rest = args[1..].iter();
    while let Some(flag) = rest.next() {
        match (flag.as_str(), rest.next()) {
            ("--priority", Some(value)) => match value.parse() {
                Ok(priority) => request = request.with_priority(priority),
                Err(_) => {
                    eprintln!("Invalid priority: {}", value);
                    return 1;
                }
            },
            ("--install", Some(path)) => request = request.with_install_location(path),
            (flag, _) => {
                eprintln!("Unknown or incomplete argument: {}", flag);
                return 1;
            }
        }
    }

    let input = Input::new(CommandType::SendEngineReloadRequest).with_engine_reload_request(request);
    match CliIpcClient::new(socket_path).send(&input).await {
        Ok(output) => match output.engine_reload_response {
            Some(response) if output.error_code == ErrorCode::SessionSuccess => {
                println!("{} request_id={}", response.status.as_str(), response.request_id);
                0
            }
            _ => {
                eprintln!("Server rejected the reload request");
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}
