//! Conversion engine boundary.
//!
//! The engine is an immutable object graph built once from a data file and
//! shared read-only by every session. Only the session handler replaces it,
//! and only while no session exists.

mod builder;
mod data;
mod error;

use std::collections::BTreeMap;
use std::path::Path;

pub use builder::{DictionaryBuilder, EngineBuilder};
pub use data::{
    encode_dictionary, encode_dictionary_with_version, EngineModules, DATA_FORMAT_VERSION,
    DATA_MAGIC,
};
pub use error::EngineError;

/// A fully built engine: validated data plus its lookup index.
pub struct Engine {
    modules: EngineModules,
    index: BTreeMap<String, Vec<String>>,
}

impl Engine {
    /// Index the dictionary body. Malformed entries make the data broken.
    pub fn new(modules: EngineModules) -> Result<Self, EngineError> {
        let body = std::str::from_utf8(modules.body())
            .map_err(|e| EngineError::DataBroken(format!("body is not UTF-8: {}", e)))?;

        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (line_no, line) in body.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let (reading, surface) = line.split_once('\t').ok_or_else(|| {
                EngineError::DataBroken(format!("line {}: missing tab separator", line_no + 1))
            })?;
            if reading.is_empty() || surface.is_empty() {
                return Err(EngineError::DataBroken(format!(
                    "line {}: empty field",
                    line_no + 1
                )));
            }
            let surfaces = index.entry(reading.to_string()).or_default();
            if !surfaces.iter().any(|s| s == surface) {
                surfaces.push(surface.to_string());
            }
        }

        Ok(Self { modules, index })
    }

    /// Engine over the builder's fallback data.
    pub fn from_default(builder: &dyn EngineBuilder) -> Result<Self, EngineError> {
        Self::new(builder.build_default())
    }

    /// Exact-match candidates for `reading`.
    pub fn lookup(&self, reading: &str) -> &[String] {
        self.index.get(reading).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candidates for every reading starting with `prefix`, exact match first.
    pub fn predict(&self, prefix: &str, limit: usize) -> Vec<String> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.index
            .range(prefix.to_string()..)
            .take_while(|(reading, _)| reading.starts_with(prefix))
            .flat_map(|(_, surfaces)| surfaces.iter().cloned())
            .take(limit)
            .collect()
    }

    pub fn data_version(&self) -> u32 {
        self.modules.version()
    }

    pub fn data_path(&self) -> Option<&Path> {
        self.modules.path()
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("modules", &self.modules)
            .field("entries", &self.index.len())
            .finish()
    }
}
