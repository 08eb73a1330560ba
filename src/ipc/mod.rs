//! IPC surface: JSON command codec and the local-socket server.
//!
//! Named pipes on Windows, Unix domain sockets elsewhere. This is the only
//! way clients reach the session handler.

mod connections;
mod protocol;
pub mod server;

pub use connections::{ConnectionGuard, ConnectionPool, DEFAULT_MAX_CONNECTIONS};
pub use protocol::{
    decode_command, decode_output, encode_input, encode_output, ProtocolError,
    DEFAULT_MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
pub use server::{
    default_socket_path, read_frame, run_server, serve_connection, write_frame, IpcServerConfig,
    ServerError,
};
