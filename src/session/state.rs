//! Per-client conversion state.

use std::sync::Arc;

use super::command::{
    ApplicationInfo, Capability, ClientConfig, ClientRequest, KeyEvent, Output, SessionCommand,
    SessionCommandType, SessionId, SpecialKey,
};
use crate::engine::Engine;

/// Ctrl+Shift+<this key> toggles incognito mode.
pub const INCOGNITO_TOGGLE_KEY: char = 'i';

/// What a key would do to the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Insert(char),
    Delete,
    Clear,
    Commit,
    NextCandidate,
    PreviousCandidate,
    ToggleIncognito,
    Ignore,
}

/// One client's composition, candidates and snapshots of shared state.
pub struct Session {
    id: SessionId,
    engine: Arc<Engine>,
    config: Arc<ClientConfig>,
    request: Arc<ClientRequest>,
    capability: Capability,
    application_info: Option<ApplicationInfo>,
    create_time: u64,
    last_command_time: u64,
    composition: String,
    candidates: Vec<String>,
    selected: usize,
}

impl Session {
    pub fn new(id: SessionId, engine: Arc<Engine>, create_time: u64) -> Self {
        Self {
            id,
            engine,
            config: Arc::new(ClientConfig::default()),
            request: Arc::new(ClientRequest::default()),
            capability: Capability::default(),
            application_info: None,
            create_time,
            last_command_time: 0,
            composition: String::new(),
            candidates: Vec::new(),
            selected: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn create_time(&self) -> u64 {
        self.create_time
    }

    /// 0 until the first command after creation.
    pub fn last_command_time(&self) -> u64 {
        self.last_command_time
    }

    pub fn set_last_command_time(&mut self, time: u64) {
        self.last_command_time = time;
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn set_config(&mut self, config: Arc<ClientConfig>) {
        self.config = config;
    }

    pub fn request(&self) -> &Arc<ClientRequest> {
        &self.request
    }

    pub fn set_request(&mut self, request: Arc<ClientRequest>) {
        self.request = request;
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn set_client_capability(&mut self, capability: Capability) {
        self.capability = capability;
    }

    pub fn application_info(&self) -> Option<&ApplicationInfo> {
        self.application_info.as_ref()
    }

    pub fn set_application_info(&mut self, info: ApplicationInfo) {
        self.application_info = Some(info);
    }

    pub fn composition(&self) -> &str {
        &self.composition
    }

    /// Apply `key`. Returns `true` when the key toggled incognito mode.
    pub fn send_key(&mut self, key: &KeyEvent, output: &mut Output) -> bool {
        let action = self.classify(key);
        let mut toggled_incognito = false;
        output.consumed = action != KeyAction::Ignore;

        match action {
            KeyAction::Insert(c) => {
                self.composition.push(c);
                self.refresh_candidates();
            }
            KeyAction::Delete => {
                self.composition.pop();
                self.refresh_candidates();
            }
            KeyAction::Clear => self.reset(),
            KeyAction::Commit => self.commit(output),
            KeyAction::NextCandidate => {
                if !self.candidates.is_empty() {
                    self.selected = (self.selected + 1) % self.candidates.len();
                }
            }
            KeyAction::PreviousCandidate => {
                if !self.candidates.is_empty() {
                    self.selected =
                        (self.selected + self.candidates.len() - 1) % self.candidates.len();
                }
            }
            KeyAction::ToggleIncognito => {
                let mut config = (*self.config).clone();
                config.incognito_mode = !config.incognito_mode;
                self.config = Arc::new(config);
                toggled_incognito = true;
            }
            KeyAction::Ignore => {}
        }

        self.fill_output(output);
        toggled_incognito
    }

    /// Report whether `key` would be consumed, without changing state.
    pub fn test_send_key(&self, key: &KeyEvent, output: &mut Output) {
        output.consumed = self.classify(key) != KeyAction::Ignore;
        self.fill_output(output);
    }

    pub fn send_command(&mut self, command: &SessionCommand, output: &mut Output) -> bool {
        let handled = match command.kind {
            SessionCommandType::Submit => {
                let had_composition = !self.composition.is_empty();
                self.commit(output);
                had_composition
            }
            SessionCommandType::Revert | SessionCommandType::ResetContext => {
                self.reset();
                true
            }
            SessionCommandType::SelectCandidate => match command.id {
                Some(index) if index < self.candidates.len() => {
                    self.selected = index;
                    self.commit(output);
                    true
                }
                _ => false,
            },
        };
        output.consumed = handled;
        self.fill_output(output);
        handled
    }

    fn classify(&self, key: &KeyEvent) -> KeyAction {
        let modifiers = key.modifiers;
        if let Some(c) = key.key {
            if modifiers.ctrl && modifiers.shift && c.eq_ignore_ascii_case(&INCOGNITO_TOGGLE_KEY) {
                return KeyAction::ToggleIncognito;
            }
            if modifiers.ctrl || modifiers.alt || c.is_control() {
                return KeyAction::Ignore;
            }
            return KeyAction::Insert(c);
        }

        let composing = !self.composition.is_empty();
        match key.special_key {
            Some(SpecialKey::Backspace) if composing => KeyAction::Delete,
            Some(SpecialKey::Escape) if composing => KeyAction::Clear,
            Some(SpecialKey::Enter) if composing => KeyAction::Commit,
            Some(SpecialKey::Space | SpecialKey::Down) if composing => KeyAction::NextCandidate,
            Some(SpecialKey::Up) if composing => KeyAction::PreviousCandidate,
            _ => KeyAction::Ignore,
        }
    }

    fn refresh_candidates(&mut self) {
        self.selected = 0;
        self.candidates.clear();
        if self.composition.is_empty() {
            return;
        }

        self.candidates
            .extend(self.engine.lookup(&self.composition).iter().cloned());
        if self.config.use_dictionary_suggest {
            let limit = self.config.suggestions_size as usize;
            for candidate in self.engine.predict(&self.composition, limit + self.candidates.len()) {
                if !self.candidates.contains(&candidate) {
                    self.candidates.push(candidate);
                }
            }
        }
    }

    fn commit(&mut self, output: &mut Output) {
        if self.composition.is_empty() {
            return;
        }
        let committed = self
            .candidates
            .get(self.selected)
            .cloned()
            .unwrap_or_else(|| self.composition.clone());
        output.result = Some(committed);
        self.reset();
    }

    fn reset(&mut self) {
        self.composition.clear();
        self.candidates.clear();
        self.selected = 0;
    }

    fn fill_output(&self, output: &mut Output) {
        output.preedit = if self.composition.is_empty() {
            None
        } else {
            Some(self.composition.clone())
        };
        output.candidates = self.candidates.clone();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("create_time", &self.create_time)
            .field("last_command_time", &self.last_command_time)
            .field("application_info", &self.application_info)
            .finish()
    }
}
