//! Engine construction errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why an engine could not be built from a data file.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Data file not found: {0}")]
    DataMissing(PathBuf),

    #[error("Data file is broken: {0}")]
    DataBroken(String),

    #[error("Data version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Failed to map data file: {0}")]
    MmapFailure(#[source] std::io::Error),

    #[error("Engine construction failed: {0}")]
    Unknown(String),
}
