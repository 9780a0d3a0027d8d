//! Disk I/O helpers: create, load, atomic write, and snapshot copy.
//!
//! Only the queue worker calls the read/write helpers once a store is open.
//! The rename-over approach is close to atomic on most platforms; on FAT32
//! or network shares there are no hard guarantees.

use crate::error::{Error, Result};
use crate::record::Table;
use crate::serializer::Serializer;
use std::io::ErrorKind;
use std::path::Path;

/// Create the data directory and an empty (`{}`) table file if either is
/// missing. Existing files are left untouched.
pub fn ensure_created(dir: &Path, file: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| Error::Io(e.to_string()))?;
        tracing::debug!(dir = %dir.display(), "created data directory");
    }
    if !file.exists() {
        std::fs::write(file, b"{}").map_err(|e| Error::Io(e.to_string()))?;
        tracing::debug!(file = %file.display(), "created empty table file");
    }
    Ok(())
}

/// Read and decode the table at `path`.
///
/// A missing file is [`Error::NotFound`]; contents that are not a JSON object
/// of objects are [`Error::Format`]. A zero-length file reads as an empty
/// table.
pub fn load<S: Serializer>(path: &Path, serializer: &S) -> Result<Table> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()))
        }
        Err(e) => return Err(Error::Io(e.to_string())),
    };
    if bytes.is_empty() {
        return Ok(Table::new());
    }
    serializer.deserialize(&bytes)
}

/// Replace the table file at `path` with `bytes`.
///
/// The new table goes to a `<name>.json.tmp` sibling first and is renamed
/// over the live file, so readers and the backup copy only ever see a whole
/// table. On failure the temp file is removed and the live file is untouched.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let staged = path.with_extension(format!("{ext}.tmp"));
    let written = std::fs::write(&staged, bytes).and_then(|()| std::fs::rename(&staged, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&staged);
        tracing::warn!(path = %path.display(), error = %e, "table write failed");
        return Err(Error::Io(e.to_string()));
    }
    Ok(())
}

/// Byte-for-byte copy of `from` onto `to`, replacing any previous copy.
pub fn snapshot(from: &Path, to: &Path) -> Result<u64> {
    match std::fs::copy(from, to) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::NotFound(from.display().to_string()))
        }
        Err(e) => Err(Error::Io(e.to_string())),
    }
}
