//! Durable cache of one file per key.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a crash mid-write leaves either the old or the new
//! contents, never a torn file.

use basket_engine::{cache::CacheResult, CacheError, DurableCache};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// [`DurableCache`] storing each key as `<dir>/<escaped key>.json`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

impl DurableCache for FileCache {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", key, e)),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create directory for", key, e))?;

        let mut file = NamedTempFile::new_in(&self.dir).map_err(|e| io_error("stage", key, e))?;
        file.write_all(bytes).map_err(|e| io_error("write", key, e))?;
        file.as_file().sync_all().map_err(|e| io_error("sync", key, e))?;
        file.persist(self.path(key))
            .map_err(|e| io_error("persist", key, e.error))?;

        tracing::trace!(key, bytes = bytes.len(), "cache entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", key, e)),
        }
    }
}

/// Keys like `basket:cart` become `basket_3Acart`.
///
/// ASCII letters, digits and `-` are kept; every other byte is written as
/// `_` plus two hex digits, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02X}"));
        }
    }
    stem
}

fn io_error(action: &str, key: &str, e: std::io::Error) -> CacheError {
    CacheError::Io(format!("failed to {action} {key}: {e}"))
}
