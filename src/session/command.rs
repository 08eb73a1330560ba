//! Command and output structures exchanged with clients.
//!
//! A [`Command`] pairs the client's [`Input`] with the [`Output`] the
//! handler fills in. Byte encoding lives in `ipc::protocol`.

use serde::{Deserialize, Serialize};

use crate::loader::{EngineReloadRequest, EngineReloadResponse};

/// Session identifier. `0` never names a live session.
pub type SessionId = u64;

/// Operation requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    #[default]
    NoOperation,
    CreateSession,
    DeleteSession,
    SendKey,
    TestSendKey,
    SendCommand,
    GetConfig,
    SetConfig,
    SetImposedConfig,
    SetRequest,
    ClearUserHistory,
    ClearUserPrediction,
    ClearUnusedUserPrediction,
    Shutdown,
    Reload,
    Cleanup,
    SendEngineReloadRequest,
    ReloadAndWait,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::NoOperation => "no_operation",
            CommandType::CreateSession => "create_session",
            CommandType::DeleteSession => "delete_session",
            CommandType::SendKey => "send_key",
            CommandType::TestSendKey => "test_send_key",
            CommandType::SendCommand => "send_command",
            CommandType::GetConfig => "get_config",
            CommandType::SetConfig => "set_config",
            CommandType::SetImposedConfig => "set_imposed_config",
            CommandType::SetRequest => "set_request",
            CommandType::ClearUserHistory => "clear_user_history",
            CommandType::ClearUserPrediction => "clear_user_prediction",
            CommandType::ClearUnusedUserPrediction => "clear_unused_user_prediction",
            CommandType::Shutdown => "shutdown",
            CommandType::Reload => "reload",
            CommandType::Cleanup => "cleanup",
            CommandType::SendEngineReloadRequest => "send_engine_reload_request",
            CommandType::ReloadAndWait => "reload_and_wait",
        }
    }
}

/// Non-printable keys a session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKey {
    Enter,
    Backspace,
    Escape,
    Space,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyEvent {
    #[serde(default)]
    pub key: Option<char>,
    #[serde(default)]
    pub special_key: Option<SpecialKey>,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn char(key: char) -> Self {
        Self {
            key: Some(key),
            ..Default::default()
        }
    }

    pub fn special(special_key: SpecialKey) -> Self {
        Self {
            special_key: Some(special_key),
            ..Default::default()
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommandType {
    Submit,
    Revert,
    SelectCandidate,
    ResetContext,
}

/// Non-key operation on a session's conversion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCommand {
    #[serde(rename = "type")]
    pub kind: SessionCommandType,
    /// Candidate index for `SelectCandidate`.
    #[serde(default)]
    pub id: Option<usize>,
}

/// Client capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default)]
    pub delete_preceding_text: bool,
}

/// Identifies the client application, for liveness checks during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationInfo {
    #[serde(default)]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub thread_id: Option<u32>,
}

/// User preferences shared by every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub incognito_mode: bool,
    #[serde(default = "default_true")]
    pub use_history_suggest: bool,
    #[serde(default = "default_true")]
    pub use_dictionary_suggest: bool,
    #[serde(default = "default_suggestions_size")]
    pub suggestions_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_suggestions_size() -> u32 {
    3
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            incognito_mode: false,
            use_history_suggest: true,
            use_dictionary_suggest: true,
            suggestions_size: default_suggestions_size(),
        }
    }
}

/// Administrator-imposed values that take precedence over [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub incognito_mode: Option<bool>,
    #[serde(default)]
    pub use_history_suggest: Option<bool>,
    #[serde(default)]
    pub use_dictionary_suggest: Option<bool>,
    #[serde(default)]
    pub suggestions_size: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(&self, base: &ClientConfig) -> ClientConfig {
        ClientConfig {
            incognito_mode: self.incognito_mode.unwrap_or(base.incognito_mode),
            use_history_suggest: self.use_history_suggest.unwrap_or(base.use_history_suggest),
            use_dictionary_suggest: self
                .use_dictionary_suggest
                .unwrap_or(base.use_dictionary_suggest),
            suggestions_size: self.suggestions_size.unwrap_or(base.suggestions_size),
        }
    }
}

/// Client-side request flags (keyboard layout, suggestion behavior).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(default)]
    pub mixed_conversion: bool,
    #[serde(default)]
    pub zero_query_suggestion: bool,
    #[serde(default)]
    pub keyboard_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "type")]
    pub kind: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<SessionCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imposed_config: Option<ConfigOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ClientRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_info: Option<ApplicationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_reload_request: Option<EngineReloadRequest>,
}

impl Input {
    pub fn new(kind: CommandType) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_key(mut self, key: KeyEvent) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_command(mut self, command: SessionCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_request(mut self, request: ClientRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_application_info(mut self, info: ApplicationInfo) -> Self {
        self.application_info = Some(info);
        self
    }

    pub fn with_engine_reload_request(mut self, request: EngineReloadRequest) -> Self {
        self.engine_reload_request = Some(request);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    SessionSuccess,
    SessionFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Output {
    #[serde(default)]
    pub id: SessionId,
    #[serde(default)]
    pub error_code: ErrorCode,
    #[serde(default)]
    pub consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preedit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_reload_response: Option<EngineReloadResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Command {
    pub input: Input,
    #[serde(default)]
    pub output: Output,
}

impl Command {
    pub fn new(input: Input) -> Self {
        Self {
            input,
            output: Output::default(),
        }
    }

    pub fn kind(&self) -> CommandType {
        self.input.kind
    }
}

impl From<Input> for Command {
    fn from(input: Input) -> Self {
        Self::new(input)
    }
}
