//! JSON wire format for commands.
//!
//! A request frame carries one [`Input`]; the reply frame carries the
//! [`Output`] the handler produced. Size limits are checked before parsing.

use thiserror::Error;

use crate::session::{failure_output, Command, Input, Output};

/// Default cap on a single frame in either direction.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Smallest frame limit the server accepts.
pub const MIN_FRAME_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

fn check_size(size: usize, max: usize) -> Result<(), ProtocolError> {
    if size > max {
        return Err(ProtocolError::MessageTooLarge { size, max });
    }
    Ok(())
}

/// Decode a request frame into a command with an empty output.
pub fn decode_command(bytes: &[u8], max: usize) -> Result<Command, ProtocolError> {
    check_size(bytes.len(), max)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::InvalidFormat("empty frame".into()));
    }
    let input: Input = serde_json::from_slice(bytes)?;
    Ok(Command::new(input))
}

pub fn encode_input(input: &Input, max: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(input)?;
    check_size(bytes.len(), max)?;
    Ok(bytes)
}

/// Encode a reply. An oversized output is replaced by a generic failure so
/// the client always receives a frame.
pub fn encode_output(output: &Output, max: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(output)?;
    if bytes.len() > max {
        tracing::warn!(size = bytes.len(), max, "reply exceeds frame limit");
        return Ok(serde_json::to_vec(&failure_output())?);
    }
    Ok(bytes)
}

pub fn decode_output(bytes: &[u8], max: usize) -> Result<Output, ProtocolError> {
    check_size(bytes.len(), max)?;
    Ok(serde_json::from_slice(bytes)?)
}
