//! Minimal client for talking to a running server from the command line.

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use thiserror::Error;

use crate::ipc::{
    decode_output, encode_input, read_frame, write_frame, ProtocolError, ServerError,
    DEFAULT_MAX_FRAME_SIZE,
};
use crate::session::{Input, Output};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] ServerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Server closed the connection without replying")]
    ConnectionClosed,
}

pub struct CliIpcClient {
    socket_path: String,
    max_frame_size: usize,
}

impl CliIpcClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Send one command on a fresh connection and wait for the reply.
    pub async fn send(&self, input: &Input) -> Result<Output, CliError> {
        let name = self.socket_path.as_str().to_fs_name::<GenericFilePath>()?;
        let mut stream = Stream::connect(name).await?;

        let request = encode_input(input, self.max_frame_size)?;
        write_frame(&mut stream, &request).await?;
        let reply = read_frame(&mut stream, self.max_frame_size)
            .await?
            .ok_or(CliError::ConnectionClosed)?;
        Ok(decode_output(&reply, self.max_frame_size)?)
    }
}
