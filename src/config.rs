//! Store configuration.

use crate::duration::parse_interval;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default store name, used for the file name.
pub const DEFAULT_NAME: &str = "store";
/// Directory created under the working directory when no path is given.
pub const DEFAULT_DIR: &str = "XennonStore";
/// Default time between scheduled backups.
pub const DEFAULT_BACKUP_INTERVAL: &str = "30 minutes";

/// Everything needed to open a store. Missing fields take their defaults when
/// deserializing, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store name. The table lives in `<path>/<name>.json`.
    pub name: String,
    /// Data directory.
    pub path: PathBuf,
    /// Start the backup timer when the store opens.
    pub backups_enabled: bool,
    /// Time between scheduled backups, e.g. `"30 minutes"` or `"2h"`.
    pub backups_interval: String,
    /// Write indented JSON instead of a single line.
    pub pretty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            name: DEFAULT_NAME.to_owned(),
            path: cwd.join(DEFAULT_DIR),
            backups_enabled: true,
            backups_interval: DEFAULT_BACKUP_INTERVAL.to_owned(),
            pretty: false,
        }
    }
}

impl StoreConfig {
    /// Parse a (possibly partial) JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check the name and interval. Returns the parsed interval.
    pub fn validate(&self) -> Result<Duration> {
        if self.name.is_empty() {
            return Err(Error::Config("store name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(Error::Config(format!(
                "store name {:?} must be a plain file name",
                self.name
            )));
        }
        parse_interval(&self.backups_interval)
    }

    /// `<path>/<name>.json`
    #[must_use]
    pub fn table_path(&self) -> PathBuf {
        self.path.join(format!("{}.json", self.name))
    }

    /// `<path>/<name>--backup.json`
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.path.join(format!("{}--backup.json", self.name))
    }

    /// Data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.path
    }
}
