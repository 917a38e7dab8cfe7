//! Advisory on-disk storage for torrent bodies, resume blobs and DHT state.
//!
//! Every operation degrades gracefully to "not cached" on error; the cache never panics
//! and never blocks a session on an I/O failure.

use log::{debug, trace, warn};
use std::path::{Path, PathBuf};

/// A keyed store of bencoded blobs rooted at a single directory.
///
/// Absent a configured directory, every operation is a no-op.
#[derive(Debug, Clone)]
pub struct CacheStore {
    directory: Option<PathBuf>,
}

impl CacheStore {
    /// Creates a cache store rooted at `directory`. Pass `None` to disable caching entirely.
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory }
    }

    /// Write `bytes` to `name`, truncating any existing contents.
    /// Returns the written path, or `None` on I/O error or when no directory is configured.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Option<PathBuf> {
        let path = self.path(name)?;

        match std::fs::write(&path, bytes) {
            Ok(_) => {
                debug!("Cached {:?} ({} bytes)", path, bytes.len());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to cache {:?}, {}", path, e);
                None
            }
        }
    }

    /// Returns `name`'s path if it exists and is readable, `None` otherwise.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        let path = self.path(name)?;
        if path.is_file() {
            Some(path)
        } else {
            trace!("Cache entry {} not found", name);
            None
        }
    }

    /// Returns the full contents of `name`, or `None` on any error.
    pub fn load(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.lookup(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to load cache entry {:?}, {}", path, e);
                None
            }
        }
    }

    /// Removes `name`, silently ignoring any failure (including "not found").
    pub fn delete(&self, name: &str) {
        if let Some(path) = self.path(name) {
            if let Err(e) = std::fs::remove_file(&path) {
                trace!("Cache entry {:?} could not be deleted, {}", path, e);
            }
        }
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.directory.as_ref().map(|dir| dir.join(name))
    }

    /// The configured cache directory, if any.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}
