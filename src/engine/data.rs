//! Dictionary data files and their memory-mapped form.
//!
//! Layout: `[magic: 8 bytes][format version: u32-le][body]`, where the body
//! is UTF-8 text with one `reading\tsurface` entry per line.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::error::EngineError;

/// Magic bytes identifying a dictionary data file.
pub const DATA_MAGIC: &[u8; 8] = b"\x89KANADIC";

/// Format version this build understands.
pub const DATA_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = DATA_MAGIC.len() + 4;

enum DataSource {
    Mapped(Mmap),
    Embedded(Vec<u8>),
}

/// Raw, validated engine data. Building an [`Engine`](super::Engine) from it
/// indexes the body.
pub struct EngineModules {
    source: DataSource,
    path: Option<PathBuf>,
    version: u32,
}

impl EngineModules {
    /// Memory-map `path` and validate its header.
    pub fn open(path: &Path, magic: Option<&[u8]>) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                EngineError::DataMissing(path.to_path_buf())
            }
            _ => EngineError::Unknown(e.to_string()),
        })?;
        // SAFETY: data files are opened read-only and replaced by rename,
        // never rewritten in place while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(EngineError::MmapFailure)?;

        let version = parse_header(&mmap, magic.unwrap_or(&DATA_MAGIC[..]))?;
        Ok(Self {
            source: DataSource::Mapped(mmap),
            path: Some(path.to_path_buf()),
            version,
        })
    }

    /// In-memory data, used for the built-in fallback dictionary.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EngineError> {
        let version = parse_header(&bytes, &DATA_MAGIC[..])?;
        Ok(Self {
            source: DataSource::Embedded(bytes),
            path: None,
            version,
        })
    }

    /// Empty dictionary with a valid header.
    pub fn empty() -> Self {
        Self {
            source: DataSource::Embedded(encode_dictionary(&[])),
            path: None,
            version: DATA_FORMAT_VERSION,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.body().is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.source {
            DataSource::Mapped(mmap) => &mmap[..],
            DataSource::Embedded(bytes) => &bytes[..],
        }
    }

    /// Entry text following the header.
    pub fn body(&self) -> &[u8] {
        &self.as_bytes()[HEADER_LEN..]
    }
}

impl std::fmt::Debug for EngineModules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineModules")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("len", &self.as_bytes().len())
            .finish()
    }
}

fn parse_header(bytes: &[u8], magic: &[u8]) -> Result<u32, EngineError> {
    if bytes.len() < magic.len() + 4 || magic.len() != DATA_MAGIC.len() {
        return Err(EngineError::DataBroken("header too short".into()));
    }
    if &bytes[..magic.len()] != magic {
        return Err(EngineError::DataBroken("magic number mismatch".into()));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[magic.len()..HEADER_LEN]);
    let found = u32::from_le_bytes(raw);
    if found != DATA_FORMAT_VERSION {
        return Err(EngineError::VersionMismatch {
            found,
            expected: DATA_FORMAT_VERSION,
        });
    }
    Ok(found)
}

/// Serialize entries into the data file layout.
pub fn encode_dictionary(entries: &[(&str, &str)]) -> Vec<u8> {
    encode_dictionary_with_version(entries, DATA_FORMAT_VERSION)
}

pub fn encode_dictionary_with_version(entries: &[(&str, &str)], version: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + entries.len() * 16);
    buf.extend_from_slice(DATA_MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    for (reading, surface) in entries {
        buf.extend_from_slice(reading.as_bytes());
        buf.push(b'\t');
        buf.extend_from_slice(surface.as_bytes());
        buf.push(b'\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_reads_header_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encode_dictionary(&[("かな", "仮名")])).unwrap();

        let modules = EngineModules::open(file.path(), None).unwrap();
        assert_eq!(modules.version(), DATA_FORMAT_VERSION);
        assert_eq!(modules.path(), Some(file.path()));
        assert!(!modules.is_empty());
    }

    #[test]
    fn missing_file_is_data_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineModules::open(&dir.path().join("none.data"), None).unwrap_err();
        assert!(matches!(err, EngineError::DataMissing(_)));
    }

    #[test]
    fn wrong_version_is_version_mismatch() {
        let bytes = encode_dictionary_with_version(&[], 7);
        let err = EngineModules::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, EngineError::VersionMismatch { found: 7, expected: 1 }));
    }

    #[test]
    fn truncated_or_foreign_data_is_broken() {
        assert!(matches!(
            EngineModules::from_bytes(vec![1, 2, 3]).unwrap_err(),
            EngineError::DataBroken(_)
        ));
        let mut bytes = encode_dictionary(&[]);
        bytes[0] = b'X';
        assert!(matches!(
            EngineModules::from_bytes(bytes).unwrap_err(),
            EngineError::DataBroken(_)
        ));
    }

    #[test]
    fn custom_magic_must_match() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encode_dictionary(&[])).unwrap();
        let err = EngineModules::open(file.path(), Some(&b"OTHERMAG"[..])).unwrap_err();
        assert!(matches!(err, EngineError::DataBroken(_)));
    }
}
