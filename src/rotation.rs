//! Bounded local log files.
//!
//! New paths get fresh files until `max_files` paths are registered. After
//! that, writing a new path recycles the oldest registered file: it is renamed
//! to the new path, truncated and rewritten, so the number of files on disk
//! never grows past the cap. A path that is already registered is appended to.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::FlushError;

/// File operations used by the rotation registry.
pub trait FileBackend: Send + Sync {
    /// Create or truncate `path` and write `bytes`.
    fn create(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Move `old` to `new`. If `old` is gone, leave an empty file at `new`.
    fn rename_or_recreate(&self, old: &Path, new: &Path) -> io::Result<()>;
}

/// `FileBackend` on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl LocalFiles {
    fn ensure_parent(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

impl FileBackend for LocalFiles {
    fn create(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        Self::ensure_parent(path)?;
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_data()
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(bytes)?;
        file.sync_data()
    }

    fn rename_or_recreate(&self, old: &Path, new: &Path) -> io::Result<()> {
        Self::ensure_parent(new)?;
        match fs::rename(old, new) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => File::create(new).map(|_| ()),
            Err(e) => Err(e),
        }
    }
}

/// What a write did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationAction {
    Created,
    Appended,
    Recycled { from: PathBuf },
}

pub struct FileRotation {
    max_files: usize,
    registry: Mutex<VecDeque<PathBuf>>,
    backend: Arc<dyn FileBackend>,
}

impl FileRotation {
    pub fn new(max_files: usize) -> Self {
        Self::with_backend(max_files, Arc::new(LocalFiles))
    }

    /// `max_files` below one is treated as one.
    pub fn with_backend(max_files: usize, backend: Arc<dyn FileBackend>) -> Self {
        let max_files = max_files.max(1);
        Self {
            max_files,
            registry: Mutex::new(VecDeque::with_capacity(max_files)),
            backend,
        }
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Registered paths, least recently rotated in first.
    pub fn registered(&self) -> Vec<PathBuf> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<RotationAction, FlushError> {
        // the lock also serializes the file operations so disk and registry agree
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let io_err = |source: io::Error| FlushError::Io {
            path: path.to_path_buf(),
            source,
        };

        if registry.iter().any(|p| p == path) {
            self.backend.append(path, bytes).map_err(io_err)?;
            return Ok(RotationAction::Appended);
        }

        if registry.len() < self.max_files {
            self.backend.create(path, bytes).map_err(io_err)?;
            registry.push_back(path.to_path_buf());
            return Ok(RotationAction::Created);
        }

        let Some(oldest) = registry.front().cloned() else {
            return Err(io_err(io::Error::other("rotation registry is empty")));
        };
        self.backend
            .rename_or_recreate(&oldest, path)
            .map_err(|source| FlushError::Io {
                path: oldest.clone(),
                source,
            })?;
        // the old name no longer exists on disk, so drop it before the write
        registry.pop_front();
        self.backend.create(path, bytes).map_err(io_err)?;
        registry.push_back(path.to_path_buf());

        debug!(from = %oldest.display(), to = %path.display(), "Recycled oldest log file");
        Ok(RotationAction::Recycled { from: oldest })
    }
}
