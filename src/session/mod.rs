//! Session lifecycle: command types, per-client state, the bounded
//! registry, and the handler that dispatches commands across them.

mod command;
mod error;
mod handler;
mod registry;
mod state;

pub use command::{
    ApplicationInfo, Capability, ClientConfig, ClientRequest, Command, CommandType,
    ConfigOverrides, ErrorCode, Input, KeyEvent, Modifiers, Output, SessionCommand,
    SessionCommandType, SessionId, SpecialKey,
};
pub use error::HandlerError;
pub use handler::{
    failure_output, SessionHandler, SessionHandlerConfig, CREATE_SESSION_TIMEOUT_RANGE,
    LAST_COMMAND_TIMEOUT_RANGE, MAX_CREATE_SESSION_MIN_INTERVAL,
};
pub use registry::{SessionRegistry, DEFAULT_SESSIONS, MAX_SESSIONS, MIN_SESSIONS};
pub use state::{Session, INCOGNITO_TOGGLE_KEY};
