//! On-disk cache of compiled programs
//!
//! Entries are addressed by the SHA-256 of the source name and text, so an
//! edited script simply misses. A file that no longer decodes (written by
//! another format version, truncated, or not a cache at all) is treated as
//! a miss and removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{read_program, write_program};
use crate::error::CacheError;
use crate::program::Program;
use crate::source::SourceFile;

/// Extension of cache entries
pub const CACHE_EXTENSION: &str = "hbc";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("cache store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cache content that cannot be recovered from by recompiling
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The fallback compiler failed
    #[error("compilation failed: {0}")]
    Compile(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Directory of `.hbc` files written with one format version
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    version: u16,
}

impl CacheStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>, version: u16) -> Self {
        Self {
            dir: dir.into(),
            version,
        }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Format version entries are written and expected with
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Content key of a source file
    pub fn key_for(source: &SourceFile) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.name().as_bytes());
        hasher.update([0]);
        hasher.update(source.text().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Path of the entry for `source`
    pub fn path_for(&self, source: &SourceFile) -> PathBuf {
        self.dir
            .join(Self::key_for(source))
            .with_extension(CACHE_EXTENSION)
    }

    /// Load the cached program for `source`, if a usable one exists
    pub fn load(&self, source: &SourceFile) -> Result<Option<Program>, StoreError> {
        let path = self.path_for(source);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(source = source.name(), "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match read_program(&bytes, self.version) {
            Ok(program)
                if program.source.name() == source.name()
                    && program.source.text() == source.text() =>
            {
                debug!(source = source.name(), path = %path.display(), "cache hit");
                Ok(Some(program))
            }
            Ok(_) => {
                debug!(source = source.name(), "cached entry belongs to different source");
                Ok(None)
            }
            Err(err) if err.is_recoverable() => {
                warn!(
                    source = source.name(),
                    path = %path.display(),
                    error = %err,
                    "discarding stale cache entry"
                );
                if let Err(e) = fs::remove_file(&path) {
                    debug!(path = %path.display(), error = %e, "failed to remove stale entry");
                }
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write `program` to its entry, returning the entry path
    ///
    /// The bytes land in a temporary sibling first and are renamed into
    /// place, so readers never observe a partially written entry.
    pub fn store(&self, program: &Program) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(&program.source);
        let temp_path = path.with_extension(format!(
            "tmp.{}.{:x}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
        ));

        fs::write(&temp_path, write_program(program, self.version))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!(source = program.source.name(), path = %path.display(), "cache stored");
        Ok(path)
    }

    /// Load `source` from the cache or compile and store it
    ///
    /// A failure to write the fresh entry is logged and otherwise ignored;
    /// the compiled program is still returned.
    pub fn load_or_compile<F, E>(
        &self,
        source: Arc<SourceFile>,
        compile: F,
    ) -> Result<Program, StoreError>
    where
        F: FnOnce(Arc<SourceFile>) -> Result<Program, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(program) = self.load(&source)? {
            return Ok(program);
        }

        let program = compile(source).map_err(|e| StoreError::Compile(Box::new(e)))?;
        if let Err(err) = self.store(&program) {
            warn!(source = program.source.name(), error = %err, "failed to write cache entry");
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_separates_name_and_text() {
        let a = SourceFile::new("ab", "c");
        let b = SourceFile::new("a", "bc");
        assert_ne!(CacheStore::key_for(&a), CacheStore::key_for(&b));
        assert_eq!(CacheStore::key_for(&a).len(), 64);
    }

    #[test]
    fn test_path_for() {
        let store = CacheStore::new("/tmp/heron", 1);
        let source = SourceFile::new("test.js", "1+1");
        let path = store.path_for(&source);
        assert_eq!(path.parent(), Some(Path::new("/tmp/heron")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("hbc"));
    }
}
