use thiserror::Error;

use super::command::SessionId;
use crate::user_data::UserDataError;

/// Why a command failed. Clients only ever see a generic failure.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Session handler is shut down")]
    Unavailable,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session creation rate limit not elapsed")]
    RateLimited,

    #[error("Command is missing field: {0}")]
    MissingField(&'static str),

    #[error("Session {0} rejected the command")]
    CommandRejected(SessionId),

    #[error("Engine reload is not configured")]
    NoDataLoader,

    #[error(transparent)]
    UserData(#[from] UserDataError),
}
