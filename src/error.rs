//! Unified error type for all store operations.

use thiserror::Error;

/// Things that can go wrong when using the store.
///
/// A missing target record is not an error: lookups return `None` and
/// mutations return `false`. Restoring without a snapshot is the one place
/// absence surfaces as [`Error::NotFound`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Input was not a non-empty key/value record.
    #[error("validation error: {0}")]
    Validation(String),
    /// A required file (table or backup snapshot) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Stored file contents are not a valid document table.
    #[error("format error: {0}")]
    Format(String),
    /// Operation not allowed in the current state (e.g. backups already running).
    #[error("state error: {0}")]
    State(String),
    /// File system problem (read, write, rename, copy).
    #[error("i/o error: {0}")]
    Io(String),
    /// Failed to turn a value into JSON.
    #[error("serialization error: {0}")]
    Serialize(String),
    /// Bad configuration (name, path, interval).
    #[error("config error: {0}")]
    Config(String),
    /// The operation queue worker has shut down.
    #[error("operation queue is closed")]
    QueueClosed,
    /// A queued task panicked. The queue keeps running.
    #[error("queued task panicked: {0}")]
    TaskPanicked(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.to_string())
        } else if err.is_syntax() || err.is_eof() {
            Error::Format(err.to_string())
        } else {
            Error::Serialize(err.to_string())
        }
    }
}

/// Result alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
