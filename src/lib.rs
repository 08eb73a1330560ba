//! kana-core: request-serving core of a Japanese input method server.
//!
//! One [`SessionServer`] per process owns the session handler behind a
//! single mutex. Commands from the IPC loop and ticks from scheduler jobs
//! both enter through that mutex, so handler state is never touched
//! concurrently.
//!
//! # Components
//!
//! - [`scheduler`]: named interval jobs with jittered start and backoff
//! - [`loader`]: priority-ordered engine reload requests, built off-thread
//! - [`session`]: registry, per-client sessions, and the command dispatcher
//! - [`ipc`]: JSON framing over a local socket

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod ipc;
pub mod loader;
pub mod platform;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod user_data;
pub mod watchdog;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ipc::{decode_command, encode_output, ProtocolError, DEFAULT_MAX_FRAME_SIZE};
use platform::CpuLoad;
use scheduler::{JobScheduler, SchedulerError};
use session::{failure_output, Command, HandlerError, SessionHandler};
use watchdog::{Watchdog, WATCHDOG_JOB};

/// The serialization boundary around a [`SessionHandler`].
pub struct SessionServer {
    handler: Arc<Mutex<SessionHandler>>,
    scheduler: Arc<dyn JobScheduler>,
    max_frame_size: usize,
    /// Cancelled once the handler has shut itself down.
    stopped: CancellationToken,
}

impl SessionServer {
    pub fn new(handler: SessionHandler, scheduler: Arc<dyn JobScheduler>) -> Self {
        Self {
            handler: Arc::new(Mutex::new(handler)),
            scheduler,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            stopped: CancellationToken::new(),
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Evaluate one decoded command.
    pub fn eval(&self, command: &mut Command) -> Result<(), HandlerError> {
        let mut handler = self.handler.lock();
        let result = handler.eval_command(command);
        if !handler.is_available() && !self.stopped.is_cancelled() {
            info!("session handler shut down");
            self.stopped.cancel();
        }
        result
    }

    /// Evaluate one request frame and return the reply frame. Undecodable
    /// requests get a generic failure reply.
    pub fn process(&self, bytes: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let output = match decode_command(bytes, self.max_frame_size) {
            Ok(mut command) => {
                // Failures are already reflected in the output.
                let _ = self.eval(&mut command);
                command.output
            }
            Err(e) => {
                warn!(error = %e, "rejecting malformed request");
                failure_output()
            }
        };
        encode_output(&output, self.max_frame_size)
    }

    /// Register the cleanup watchdog with the scheduler.
    pub fn start_watchdog(
        &self,
        load: Arc<dyn CpuLoad>,
        threshold: f32,
    ) -> Result<(), SchedulerError> {
        let interval = self.handler.lock().settings().watchdog_interval;
        let watchdog = Watchdog::new(self.handler.clone(), load, threshold)
            .with_stop_signal(self.stopped.clone());
        self.scheduler.add_job(watchdog.into_job(interval))
    }

    pub fn stop_watchdog(&self) -> bool {
        self.scheduler.remove_job(WATCHDOG_JOB)
    }

    pub fn is_available(&self) -> bool {
        self.handler.lock().is_available()
    }

    /// Fires when the handler stops accepting commands, whether through a
    /// `Shutdown` command or a watchdog idle shutdown.
    pub fn stopped(&self) -> &CancellationToken {
        &self.stopped
    }

    pub fn handler(&self) -> &Arc<Mutex<SessionHandler>> {
        &self.handler
    }

    pub fn scheduler(&self) -> &Arc<dyn JobScheduler> {
        &self.scheduler
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.scheduler.remove_job(WATCHDOG_JOB);
    }
}
