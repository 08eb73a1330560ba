//! Engine construction entry points.

use std::path::Path;

use super::data::EngineModules;
use super::error::EngineError;

/// Builds engine data from a data file.
///
/// Called off the serving thread by the data loader, so implementations may
/// block on file I/O.
pub trait EngineBuilder: Send + Sync {
    /// Build from `path`, checking the file's magic number when given.
    fn build(&self, path: &Path, magic: Option<&[u8]>) -> Result<EngineModules, EngineError>;

    /// Fallback data used when no data file is configured or loadable.
    fn build_default(&self) -> EngineModules;
}

/// Builder for memory-mapped dictionary data files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictionaryBuilder;

impl EngineBuilder for DictionaryBuilder {
    fn build(&self, path: &Path, magic: Option<&[u8]>) -> Result<EngineModules, EngineError> {
        EngineModules::open(path, magic)
    }

    fn build_default(&self) -> EngineModules {
        EngineModules::empty()
    }
}
