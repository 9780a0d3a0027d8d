//! The file-backed document table, as owned by the queue worker.
//!
//! The in-memory [`Table`] is the source of truth for reads. Every committed
//! change is flushed to disk in full before it becomes visible, and bumps the
//! table version. A failed flush leaves the previous version in place.

use crate::error::{Error, Result};
use crate::persist::{atomic_write, ensure_created, load, snapshot};
use crate::record::Table;
use crate::serializer::{JsonSerializer, Serializer};
use std::path::{Path, PathBuf};

/// Live table, its file, and its backup snapshot location.
#[derive(Debug)]
pub struct TableFile {
    dir: PathBuf,
    path: PathBuf,
    backup_path: PathBuf,
    serializer: JsonSerializer,
    table: Table,
    version: u64,
}

impl TableFile {
    /// Create the directory and file if needed, then load the table.
    pub fn open(
        dir: PathBuf,
        path: PathBuf,
        backup_path: PathBuf,
        serializer: JsonSerializer,
    ) -> Result<Self> {
        ensure_created(&dir, &path)?;
        let table = load(&path, &serializer)?;
        tracing::debug!(path = %path.display(), records = table.len(), "loaded table");
        Ok(Self {
            dir,
            path,
            backup_path,
            serializer,
            table,
            version: 0,
        })
    }

    /// Current table.
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of commits since the store was opened.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Path of the live table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush `next` to disk, then make it the current table.
    pub fn commit(&mut self, next: Table) -> Result<u64> {
        let bytes = self.serializer.serialize(&next)?;
        atomic_write(&self.path, &bytes)?;
        self.table = next;
        self.version += 1;
        tracing::debug!(
            version = self.version,
            records = self.table.len(),
            bytes = bytes.len(),
            "committed table"
        );
        Ok(self.version)
    }

    /// Copy the live file over the snapshot.
    pub fn backup(&self) -> Result<&Path> {
        let bytes = snapshot(&self.path, &self.backup_path)?;
        tracing::info!(path = %self.backup_path.display(), bytes, "wrote backup snapshot");
        Ok(&self.backup_path)
    }

    /// Replace the table with the snapshot's contents.
    pub fn restore(&mut self) -> Result<()> {
        if !self.backup_path.exists() {
            return Err(Error::NotFound(format!(
                "no backup at {}",
                self.backup_path.display()
            )));
        }
        ensure_created(&self.dir, &self.path)?;
        let restored = load(&self.backup_path, &self.serializer)?;
        let records = restored.len();
        self.commit(restored)?;
        tracing::info!(path = %self.path.display(), records, "restored table from backup");
        Ok(())
    }
}
