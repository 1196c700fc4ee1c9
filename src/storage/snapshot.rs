use std::io::Write;
use std::path::{Path, PathBuf};

use super::write_atomically;
use crate::engine::Engine;
use crate::error::Result;

/// The engine snapshot on disk.
///
/// The content is whatever [`Engine::snapshot`] produces; it is written
/// through a temp file and renamed over the previous snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the file if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if removal fails.
    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            trace_info!(path = %self.path.display(), "engine snapshot removed");
        }
        Ok(())
    }

    /// Restore an engine from the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if the file cannot be
    /// read and [`Error::Snapshot`](crate::Error::Snapshot) if the engine
    /// rejects its content.
    pub fn load<E: Engine>(&self) -> Result<E> {
        let bytes = std::fs::read(&self.path)?;
        let engine = E::restore(&bytes)?;
        trace_info!(path = %self.path.display(), "engine snapshot loaded");
        Ok(engine)
    }

    /// Write `engine`'s snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`](crate::Error::Snapshot) if the engine
    /// cannot serialize itself and [`Error::Storage`](crate::Error::Storage)
    /// if writing fails.
    pub fn save<E: Engine>(&self, engine: &E) -> Result<()> {
        let bytes = engine.snapshot()?;
        write_atomically(&self.path, |file| Ok(file.write_all(&bytes)?))?;
        trace_info!(path = %self.path.display(), bytes = bytes.len(), "engine snapshot saved");
        Ok(())
    }
}
