//! Local-socket acceptor loop.
//!
//! Frames are `[len: u32-le][payload]`. Each connection is served by its
//! own task; commands are evaluated on the blocking pool because the
//! handler may wait on an engine build.

use std::io;
use std::sync::Arc;

use interprocess::local_socket::tokio::prelude::*;
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connections::{ConnectionPool, DEFAULT_MAX_CONNECTIONS};
use super::protocol::{ProtocolError, DEFAULT_MAX_FRAME_SIZE};
use crate::SessionServer;

#[cfg(unix)]
pub const SOCKET_FILE_NAME: &str = "kana-core.sock";

#[cfg(windows)]
pub const DEFAULT_SOCKET_PATH: &str = r"\\.\pipe\kana-core";

/// Socket path used when none is configured.
pub fn default_socket_path() -> String {
    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(SOCKET_FILE_NAME)
            .to_string_lossy()
            .into_owned()
    }
    #[cfg(windows)]
    {
        DEFAULT_SOCKET_PATH.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    pub socket_path: String,
    pub max_frame_size: usize,
    pub max_connections: usize,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Command task failed: {0}")]
    Task(String),
}

/// Read one frame. `Ok(None)` means the peer closed the connection cleanly.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_le_bytes(len_buf) as usize;
    if size > max {
        return Err(ServerError::FrameTooLarge { size, max });
    }
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let size = u32::try_from(payload.len()).map_err(|_| ServerError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&size.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve request/reply frames on one connection until the peer hangs up,
/// `shutdown` fires, or the handler shuts itself down. The last case
/// cancels `shutdown` so the acceptor stops too.
pub async fn serve_connection<S>(
    mut stream: S,
    server: Arc<SessionServer>,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let max = server.max_frame_size();
    let stopped = server.stopped().clone();
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = stopped.cancelled() => {
                shutdown.cancel();
                return Ok(());
            }
            frame = read_frame(&mut stream, max) => frame?,
        };
        let Some(request) = frame else {
            return Ok(());
        };

        let worker = server.clone();
        let reply = tokio::task::spawn_blocking(move || worker.process(&request))
            .await
            .map_err(|e| ServerError::Task(e.to_string()))??;
        write_frame(&mut stream, &reply).await?;

        if stopped.is_cancelled() {
            info!("session handler shut down, stopping IPC server");
            shutdown.cancel();
            return Ok(());
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &str) {
    use std::os::unix::fs::FileTypeExt;

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path, error = %e, "failed to remove stale socket");
            }
        }
    }
}

/// Accept clients on `config.socket_path` until `shutdown` is cancelled or
/// the handler stops. A handler stop also cancels `shutdown`.
pub async fn run_server(
    config: IpcServerConfig,
    server: Arc<SessionServer>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    #[cfg(unix)]
    remove_stale_socket(&config.socket_path);

    let name = config.socket_path.as_str().to_fs_name::<GenericFilePath>()?;
    let listener = ListenerOptions::new().name(name).create_tokio()?;
    let pool = ConnectionPool::new(config.max_connections);
    info!(
        path = %config.socket_path,
        max_connections = pool.max_connections(),
        "IPC server listening"
    );

    let stopped = server.stopped().clone();
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = stopped.cancelled() => {
                info!("session handler shut down, stopping IPC server");
                shutdown.cancel();
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        let Some(guard) = pool.try_acquire() else {
            warn!(active = pool.active_count(), "connection limit reached, dropping client");
            continue;
        };

        let server = server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = serve_connection(stream, server, shutdown).await {
                debug!(error = %e, "connection closed with error");
            }
        });
    }

    #[cfg(unix)]
    remove_stale_socket(&config.socket_path);
    info!("IPC server stopped");
    Ok(())
}
