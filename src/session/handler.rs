//! Command dispatcher owning the session registry and the active engine.
//!
//! Every method takes `&mut self`; callers serialize access (see
//! `SessionServer`). The engine is replaced only while the registry is empty,
//! so no session ever holds an engine that is being swapped out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use super::command::{
    ClientConfig, ClientRequest, Command, CommandType, ConfigOverrides, ErrorCode, Output,
    SessionId,
};
use super::error::HandlerError;
use super::registry::{SessionRegistry, DEFAULT_SESSIONS, MAX_SESSIONS, MIN_SESSIONS};
use super::state::Session;
use crate::clock::{Clock, SystemClock};
use crate::engine::Engine;
use crate::loader::{BuildHandle, DataLoader, EngineReloadResponse, ReloadStatus};
use crate::platform::{ApplicationLiveness, ProcessLiveness};
use crate::telemetry;
use crate::user_data::{NullUserDataStore, UserDataStore};

/// Attempts at drawing an unused random id before giving up.
const MAX_ID_ATTEMPTS: usize = 500;

pub const MAX_CREATE_SESSION_MIN_INTERVAL: Duration = Duration::from_secs(10);
pub const LAST_COMMAND_TIMEOUT_RANGE: (Duration, Duration) =
    (Duration::from_secs(10), Duration::from_secs(7200));
pub const CREATE_SESSION_TIMEOUT_RANGE: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(600));

/// Session limits and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandlerConfig {
    pub max_sessions: usize,
    pub create_session_min_interval: Duration,
    /// Expected period between `Cleanup` commands.
    pub watchdog_interval: Duration,
    pub last_command_timeout: Duration,
    pub create_session_timeout: Duration,
    /// Shut down after the registry has been empty this long.
    pub idle_shutdown_timeout: Option<Duration>,
}

impl Default for SessionHandlerConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_SESSIONS,
            create_session_min_interval: Duration::ZERO,
            watchdog_interval: Duration::from_secs(180),
            last_command_timeout: Duration::from_secs(3600),
            create_session_timeout: Duration::from_secs(300),
            idle_shutdown_timeout: None,
        }
    }
}

impl SessionHandlerConfig {
    /// Tight limits for short-lived sandboxed launches.
    pub fn restricted() -> Self {
        Self {
            max_sessions: 8,
            create_session_min_interval: Duration::ZERO,
            watchdog_interval: Duration::from_secs(15),
            last_command_timeout: Duration::from_secs(60),
            create_session_timeout: Duration::from_secs(60),
            idle_shutdown_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Force every value into its supported range.
    pub fn clamped(self) -> Self {
        let (command_min, command_max) = LAST_COMMAND_TIMEOUT_RANGE;
        let (create_min, create_max) = CREATE_SESSION_TIMEOUT_RANGE;
        Self {
            max_sessions: self.max_sessions.clamp(MIN_SESSIONS, MAX_SESSIONS),
            create_session_min_interval: self
                .create_session_min_interval
                .min(MAX_CREATE_SESSION_MIN_INTERVAL),
            watchdog_interval: self.watchdog_interval.max(Duration::from_secs(1)),
            last_command_timeout: self.last_command_timeout.clamp(command_min, command_max),
            create_session_timeout: self.create_session_timeout.clamp(create_min, create_max),
            idle_shutdown_timeout: self.idle_shutdown_timeout.filter(|t| !t.is_zero()),
        }
    }
}

pub struct SessionHandler {
    settings: SessionHandlerConfig,
    registry: SessionRegistry,
    engine: Arc<Engine>,
    data_loader: Option<DataLoader>,
    build: Option<BuildHandle>,
    last_reload_response: Option<EngineReloadResponse>,
    /// Config as set by the user.
    config: ClientConfig,
    imposed_config: ConfigOverrides,
    /// `imposed_config` applied over `config`; what sessions see.
    effective_config: Arc<ClientConfig>,
    request: Arc<ClientRequest>,
    clock: Arc<dyn Clock>,
    liveness: Arc<dyn ApplicationLiveness>,
    user_data: Arc<dyn UserDataStore>,
    last_create_session_time: u64,
    last_cleanup_time: u64,
    last_session_empty_time: u64,
    available: bool,
}

impl SessionHandler {
    pub fn new(engine: Arc<Engine>, settings: SessionHandlerConfig) -> Self {
        let settings = settings.clamped();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = ClientConfig::default();
        Self {
            registry: SessionRegistry::new(settings.max_sessions),
            settings,
            engine,
            data_loader: None,
            build: None,
            last_reload_response: None,
            effective_config: Arc::new(config.clone()),
            config,
            imposed_config: ConfigOverrides::default(),
            request: Arc::new(ClientRequest::default()),
            last_session_empty_time: clock.now_secs(),
            clock,
            liveness: Arc::new(ProcessLiveness::new()),
            user_data: Arc::new(NullUserDataStore::new()),
            last_create_session_time: 0,
            last_cleanup_time: 0,
            available: true,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.last_session_empty_time = clock.now_secs();
        self.clock = clock;
        self
    }

    pub fn with_liveness(mut self, liveness: Arc<dyn ApplicationLiveness>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_user_data(mut self, user_data: Arc<dyn UserDataStore>) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn with_data_loader(mut self, loader: DataLoader) -> Self {
        self.data_loader = Some(loader);
        self
    }

    /// Evaluate one command, filling `command.output`.
    ///
    /// Any error leaves the output as a generic failure with id 0.
    pub fn eval_command(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let started = Instant::now();
        let kind = command.kind();

        let result = if self.available {
            self.dispatch(command)
        } else {
            Err(HandlerError::Unavailable)
        };

        match &result {
            Ok(()) => {
                command.output.error_code = ErrorCode::SessionSuccess;
                if kind != CommandType::CreateSession {
                    command.output.id = command.input.id.unwrap_or(0);
                }
            }
            Err(e) => {
                debug!(command = kind.as_str(), error = %e, "command failed");
                command.output.error_code = ErrorCode::SessionFailure;
                command.output.id = 0;
            }
        }

        telemetry::record_command(kind.as_str(), started.elapsed(), result.is_ok());
        telemetry::record_active_sessions(self.registry.len());
        result
    }

    fn dispatch(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        match command.kind() {
            CommandType::NoOperation => Ok(()),
            CommandType::CreateSession => self.create_session(command),
            CommandType::DeleteSession => self.delete_session(command),
            CommandType::SendKey => self.send_key(command),
            CommandType::TestSendKey => self.test_send_key(command),
            CommandType::SendCommand => self.send_command(command),
            CommandType::GetConfig => {
                command.output.config = Some((*self.effective_config).clone());
                Ok(())
            }
            CommandType::SetConfig => self.set_config(command),
            CommandType::SetImposedConfig => self.set_imposed_config(command),
            CommandType::SetRequest => self.set_request(command),
            CommandType::ClearUserHistory => self.user_data.clear_user_history().map_err(Into::into),
            CommandType::ClearUserPrediction => {
                self.user_data.clear_user_prediction().map_err(Into::into)
            }
            CommandType::ClearUnusedUserPrediction => self
                .user_data
                .clear_unused_user_prediction()
                .map_err(Into::into),
            CommandType::Shutdown => {
                self.shutdown();
                Ok(())
            }
            CommandType::Reload => self.reload(),
            CommandType::Cleanup => {
                self.cleanup();
                Ok(())
            }
            CommandType::SendEngineReloadRequest => self.send_engine_reload_request(command),
            CommandType::ReloadAndWait => self.reload_and_wait(command),
        }
    }

    fn create_session(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let now = self.clock.now_secs();
        let min_interval = self.settings.create_session_min_interval.as_secs();
        if min_interval > 0
            && self.last_create_session_time != 0
            && now.saturating_sub(self.last_create_session_time) < min_interval
        {
            warn!(min_interval, "session creation rate limited");
            return Err(HandlerError::RateLimited);
        }
        self.last_create_session_time = now;

        if self.registry.is_full() {
            if let Some(evicted) = self.registry.evict_oldest() {
                info!(session_id = evicted.id(), "evicted oldest session at capacity");
                telemetry::record_session_evicted("capacity");
            }
        }

        if self.registry.is_empty() {
            if let Some(response) = self.maybe_reload_engine() {
                command.output.engine_reload_response = Some(response);
            }
        }

        let id = self.allocate_session_id();
        let mut session = Session::new(id, self.engine.clone(), now);
        session.set_config(self.effective_config.clone());
        session.set_request(self.request.clone());
        if let Some(capability) = command.input.capability {
            session.set_client_capability(capability);
        }
        if let Some(info) = command.input.application_info {
            session.set_application_info(info);
        }

        if self.registry.insert(session).is_some() {
            panic!("session registry evicted while below capacity");
        }
        command.output.id = id;
        self.last_session_empty_time = 0;
        debug!(session_id = id, sessions = self.registry.len(), "session created");
        Ok(())
    }

    fn delete_session(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let id = command.input.id.unwrap_or(0);
        match self.registry.erase(id) {
            Some(_) => debug!(session_id = id, "session deleted"),
            None if id != 0 => warn!(session_id = id, "deleting unknown session"),
            None => {}
        }
        self.sync_user_data();
        Ok(())
    }

    fn send_key(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let id = command.input.id.unwrap_or(0);
        let key = command.input.key.clone().ok_or(HandlerError::MissingField("key"))?;
        let now = self.clock.now_secs();
        let session = self
            .registry
            .lookup_mut(id)
            .ok_or(HandlerError::SessionNotFound(id))?;

        session.set_last_command_time(now);
        if session.send_key(&key, &mut command.output) {
            self.config.incognito_mode = !self.config.incognito_mode;
            self.refresh_config();
        }
        Ok(())
    }

    fn test_send_key(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let id = command.input.id.unwrap_or(0);
        let key = command.input.key.as_ref().ok_or(HandlerError::MissingField("key"))?;
        let now = self.clock.now_secs();
        let session = self
            .registry
            .lookup_mut(id)
            .ok_or(HandlerError::SessionNotFound(id))?;

        session.set_last_command_time(now);
        session.test_send_key(key, &mut command.output);
        Ok(())
    }

    fn send_command(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let id = command.input.id.unwrap_or(0);
        let session_command = command
            .input
            .command
            .ok_or(HandlerError::MissingField("command"))?;
        let now = self.clock.now_secs();
        let session = self
            .registry
            .lookup_mut(id)
            .ok_or(HandlerError::SessionNotFound(id))?;

        session.set_last_command_time(now);
        if session.send_command(&session_command, &mut command.output) {
            Ok(())
        } else {
            Err(HandlerError::CommandRejected(id))
        }
    }

    fn set_config(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let config = command
            .input
            .config
            .clone()
            .ok_or(HandlerError::MissingField("config"))?;
        self.config = config;
        self.refresh_config();
        command.output.config = Some((*self.effective_config).clone());
        Ok(())
    }

    fn set_imposed_config(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let imposed = command
            .input
            .imposed_config
            .clone()
            .ok_or(HandlerError::MissingField("imposed_config"))?;
        self.imposed_config = imposed;
        self.refresh_config();
        command.output.config = Some((*self.effective_config).clone());
        Ok(())
    }

    fn set_request(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let request = command
            .input
            .request
            .clone()
            .ok_or(HandlerError::MissingField("request"))?;
        self.request = Arc::new(request);
        for session in self.registry.iter_mut() {
            session.set_request(self.request.clone());
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<(), HandlerError> {
        self.user_data.reload()?;
        self.refresh_config();
        info!("user data reloaded");
        Ok(())
    }

    fn reload_and_wait(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        self.reload()?;
        self.user_data.wait()?;
        if let Some(build) = self.build.take() {
            let build = build.wait();
            command.output.engine_reload_response =
                build.response().map(|r| r.response.clone());
            self.build = Some(build);
        }
        Ok(())
    }

    fn send_engine_reload_request(&mut self, command: &mut Command) -> Result<(), HandlerError> {
        let request = command
            .input
            .engine_reload_request
            .clone()
            .ok_or(HandlerError::MissingField("engine_reload_request"))?;
        let loader = self.data_loader.as_ref().ok_or(HandlerError::NoDataLoader)?;

        let front = loader.register_request(&request);
        info!(request_id = front, path = %request.file_path.display(), "engine reload requested");
        self.maybe_start_build();

        command.output.engine_reload_response = Some(EngineReloadResponse {
            status: ReloadStatus::Accepted,
            request_id: front,
            request: Some(request),
        });
        Ok(())
    }

    fn cleanup(&mut self) {
        let now = self.clock.now_secs();
        let suspend = self.suspend_duration(now);
        self.last_cleanup_time = now;

        let create_timeout = self.settings.create_session_timeout.as_secs() + suspend;
        let command_timeout = self.settings.last_command_timeout.as_secs() + suspend;
        if suspend > 0 {
            info!(suspend_secs = suspend, "host suspend detected, extending session timeouts");
        }

        let liveness = self.liveness.as_ref();
        let stale: Vec<SessionId> = self
            .registry
            .iter_oldest_first()
            .filter(|session| {
                if let Some(info) = session.application_info() {
                    if !liveness.is_alive(info) {
                        return true;
                    }
                }
                match session.last_command_time() {
                    0 => now.saturating_sub(session.create_time()) >= create_timeout,
                    last => now.saturating_sub(last) >= command_timeout,
                }
            })
            .map(Session::id)
            .collect();

        for id in &stale {
            self.registry.erase(*id);
            telemetry::record_session_evicted("cleanup");
        }
        if !stale.is_empty() {
            info!(removed = stale.len(), remaining = self.registry.len(), "stale sessions removed");
        }

        self.sync_user_data();

        if !self.registry.is_empty() {
            self.last_session_empty_time = 0;
            return;
        }
        if self.last_session_empty_time == 0 {
            self.last_session_empty_time = now;
        }
        if let Some(idle) = self.settings.idle_shutdown_timeout {
            if now.saturating_sub(self.last_session_empty_time) >= idle.as_secs() {
                info!(idle_secs = idle.as_secs(), "no sessions for idle timeout, shutting down");
                self.shutdown();
            }
        }
    }

    /// Time the host was likely suspended since the previous cleanup.
    fn suspend_duration(&self, now: u64) -> u64 {
        if self.last_cleanup_time == 0 {
            return 0;
        }
        let expected = 2 * self.settings.watchdog_interval.as_secs();
        now.saturating_sub(self.last_cleanup_time)
            .saturating_sub(expected)
    }

    fn shutdown(&mut self) {
        self.sync_user_data();
        if let Some(loader) = &self.data_loader {
            loader.clear();
        }
        self.available = false;
        info!(sessions = self.registry.len(), "session handler shut down");
    }

    fn sync_user_data(&self) {
        if let Err(e) = self.user_data.sync() {
            warn!(error = %e, "failed to sync user data");
        }
    }

    fn refresh_config(&mut self) {
        self.effective_config = Arc::new(self.imposed_config.apply(&self.config));
        for session in self.registry.iter_mut() {
            session.set_config(self.effective_config.clone());
        }
    }

    fn allocate_session_id(&self) -> SessionId {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id: SessionId = rng.gen();
            if id != 0 && !self.registry.contains(id) {
                return id;
            }
        }
        panic!("unable to allocate a session id after {MAX_ID_ATTEMPTS} attempts");
    }

    /// Start building the pipeline's front request unless it is already
    /// being built. A superseded build keeps running detached.
    fn maybe_start_build(&mut self) {
        let Some(loader) = &self.data_loader else {
            return;
        };
        let front = loader.front_id();
        if front == 0 || self.build.as_ref().map(BuildHandle::id) == Some(front) {
            return;
        }
        debug!(request_id = front, "starting engine build");
        self.build = Some(loader.build(front));
    }

    /// Install a finished build. Only valid while no session exists.
    fn maybe_reload_engine(&mut self) -> Option<EngineReloadResponse> {
        if !self.registry.is_empty() || !self.build.as_ref().is_some_and(BuildHandle::is_ready) {
            return None;
        }
        let loader = self.data_loader.as_ref()?;
        let loaded = self.build.take()?.into_response();

        if loaded.id != loader.front_id() {
            debug!(request_id = loaded.id, "discarding superseded engine build");
            self.maybe_start_build();
            return None;
        }

        let mut response = loaded.response;
        let engine = match loaded.engine {
            Some(engine) if response.status == ReloadStatus::ReloadReady => engine,
            _ => {
                warn!(request_id = loaded.id, status = response.status.as_str(), "engine build failed");
                telemetry::record_engine_reload(response.status.as_str());
                loader.unregister_request(loaded.id);
                self.last_reload_response = Some(response.clone());
                self.maybe_start_build();
                return Some(response);
            }
        };

        info!(
            request_id = loaded.id,
            entries = engine.entry_count(),
            version = engine.data_version(),
            "engine reloaded"
        );
        self.engine = Arc::new(engine);
        loader.clear();
        response.status = ReloadStatus::Reloaded;
        telemetry::record_engine_reload(response.status.as_str());
        self.last_reload_response = Some(response.clone());
        Some(response)
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn settings(&self) -> &SessionHandlerConfig {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.effective_config
    }

    pub fn request(&self) -> &Arc<ClientRequest> {
        &self.request
    }

    pub fn data_loader(&self) -> Option<&DataLoader> {
        self.data_loader.as_ref()
    }

    pub fn last_reload_response(&self) -> Option<&EngineReloadResponse> {
        self.last_reload_response.as_ref()
    }

    /// Id of the request currently being built, if any.
    pub fn building_request(&self) -> Option<u64> {
        self.build.as_ref().map(BuildHandle::id)
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("settings", &self.settings)
            .field("sessions", &self.registry.len())
            .field("engine", &self.engine)
            .field("available", &self.available)
            .finish()
    }
}

/// Output for a failed command, as clients see it.
pub fn failure_output() -> Output {
    Output {
        error_code: ErrorCode::SessionFailure,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_enforces_ranges() {
        let settings = SessionHandlerConfig {
            max_sessions: 1000,
            create_session_min_interval: Duration::from_secs(60),
            watchdog_interval: Duration::ZERO,
            last_command_timeout: Duration::from_secs(1),
            create_session_timeout: Duration::from_secs(10_000),
            idle_shutdown_timeout: Some(Duration::ZERO),
        }
        .clamped();

        assert_eq!(settings.max_sessions, MAX_SESSIONS);
        assert_eq!(settings.create_session_min_interval, Duration::from_secs(10));
        assert_eq!(settings.watchdog_interval, Duration::from_secs(1));
        assert_eq!(settings.last_command_timeout, Duration::from_secs(10));
        assert_eq!(settings.create_session_timeout, Duration::from_secs(600));
        assert_eq!(settings.idle_shutdown_timeout, None);
    }

    #[test]
    fn restricted_is_within_range() {
        let restricted = SessionHandlerConfig::restricted();
        assert_eq!(restricted.clone().clamped(), restricted);
    }

    #[test]
    fn default_settings_match_documented_values() {
        let settings = SessionHandlerConfig::default();
        assert_eq!(settings.max_sessions, 64);
        assert_eq!(settings.watchdog_interval, Duration::from_secs(180));
        assert_eq!(settings.last_command_timeout, Duration::from_secs(3600));
        assert_eq!(settings.create_session_timeout, Duration::from_secs(300));
        assert!(settings.idle_shutdown_timeout.is_none());
    }
}
