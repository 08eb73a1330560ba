//! Reload request and response types carried on the wire.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Priority assigned when a request does not carry one. Lower is more urgent.
pub const DEFAULT_RELOAD_PRIORITY: u32 = 100;

fn default_priority() -> u32 {
    DEFAULT_RELOAD_PRIORITY
}

/// Request to replace the active engine with one built from `file_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineReloadRequest {
    pub file_path: PathBuf,
    /// Where to copy the data file once it has been validated.
    #[serde(default)]
    pub install_location: Option<PathBuf>,
    /// Expected magic bytes of the data file.
    #[serde(default)]
    pub magic_number: Option<Vec<u8>>,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl EngineReloadRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            install_location: None,
            magic_number: None,
            priority: DEFAULT_RELOAD_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_install_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.install_location = Some(location.into());
        self
    }

    pub fn with_magic_number(mut self, magic: impl Into<Vec<u8>>) -> Self {
        self.magic_number = Some(magic.into());
        self
    }
}

/// Progress of a reload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStatus {
    /// Registered, build pending or running.
    Accepted,
    /// Built; waiting for the session registry to empty.
    ReloadReady,
    /// Installed as the active engine.
    Reloaded,
    DataMissing,
    DataBroken,
    EngineVersionMismatch,
    MmapFailure,
    InstallFailure,
    UnknownError,
}

impl ReloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadStatus::Accepted => "accepted",
            ReloadStatus::ReloadReady => "reload_ready",
            ReloadStatus::Reloaded => "reloaded",
            ReloadStatus::DataMissing => "data_missing",
            ReloadStatus::DataBroken => "data_broken",
            ReloadStatus::EngineVersionMismatch => "engine_version_mismatch",
            ReloadStatus::MmapFailure => "mmap_failure",
            ReloadStatus::InstallFailure => "install_failure",
            ReloadStatus::UnknownError => "unknown_error",
        }
    }

    pub fn is_failure(self) -> bool {
        !matches!(
            self,
            ReloadStatus::Accepted | ReloadStatus::ReloadReady | ReloadStatus::Reloaded
        )
    }
}

impl From<&EngineError> for ReloadStatus {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::DataMissing(_) => ReloadStatus::DataMissing,
            EngineError::DataBroken(_) => ReloadStatus::DataBroken,
            EngineError::VersionMismatch { .. } => ReloadStatus::EngineVersionMismatch,
            EngineError::MmapFailure(_) => ReloadStatus::MmapFailure,
            EngineError::Unknown(_) => ReloadStatus::UnknownError,
        }
    }
}

/// Status report for a reload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineReloadResponse {
    pub status: ReloadStatus,
    /// Fingerprint of the request this status refers to.
    pub request_id: u64,
    #[serde(default)]
    pub request: Option<EngineReloadRequest>,
}
